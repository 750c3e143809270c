//! Projection of bucket summaries into heatmap cells.
//!
//! Every [`BucketSummary`] becomes a [`VisualUnit`] carrying a discrete
//! color-scale level and the tooltip text shown on hover. Levels are
//! relative to the busiest bucket:
//!
//! ```text
//! level = ceil(count / max * LEVELS)
//! ```
//!
//! [`render`] draws the units as a terminal grid: a calendar of weeks for
//! daily buckets, a single row for hourly buckets.

use std::{
    collections::HashMap,
    fmt::{self, Write},
    time::Duration,
};

use time::Date;

use crate::aggregate::{BucketKey, BucketSummary};

/// Number of non-empty color-scale levels.
pub const LEVELS: u8 = 4;

/// Cell glyphs by level; index 0 is a bucket without plays.
const SHADES: [char; LEVELS as usize + 1] = ['·', '░', '▒', '▓', '█'];

const WEEKDAYS: [&str; 7] = ["Mon", "", "Wed", "", "Fri", "", "Sun"];

/// One renderable heatmap cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualUnit {
    pub key: BucketKey,
    pub count: u32,
    /// Color-scale level, 0 through [`LEVELS`].
    pub level: u8,
    /// Style class, e.g. `color-scale-3`.
    pub class_name: String,
    pub tooltip: String,
}

/// Color-scale level of `count` relative to `max`.
#[must_use]
pub fn scale_level(count: u32, max: u32) -> u8 {
    let max = u64::from(max.max(1));
    let level = (u64::from(count) * u64::from(LEVELS)).div_ceil(max);
    u8::try_from(level.min(u64::from(LEVELS))).unwrap_or(LEVELS)
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn counted<N>(count: N, one: &str, many: &str) -> String
where
    N: fmt::Display + PartialEq + From<u8>,
{
    if count == N::from(1) {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

/// Hover text of a summary.
#[must_use]
pub fn tooltip(summary: &BucketSummary) -> String {
    let label = summary.key;
    if summary.count == 0 {
        return format!("{label}: no plays");
    }

    let plays = counted(summary.count, "play", "plays");
    let mut text = format!("{label}: {plays}");

    if let Some(track) = summary.most_played_track() {
        let _ = write!(text, ", most played song: {track}");
    }
    if let Some(artist) = summary.most_played_artist() {
        let _ = write!(text, ", most played artist: {artist}");
    }
    let _ = write!(
        text,
        ", {} by {}",
        counted(summary.unique_tracks(), "unique song", "unique songs"),
        counted(summary.unique_artists(), "artist", "artists")
    );
    if let Some(average) = summary.average_duration() {
        let _ = write!(text, ", average length {}", format_duration(average));
    }

    text
}

/// Projects summaries into visual units.
#[must_use]
pub fn to_visual_units(summaries: &[BucketSummary]) -> Vec<VisualUnit> {
    let max = summaries
        .iter()
        .map(|summary| summary.count)
        .max()
        .unwrap_or_default()
        .max(1);

    summaries
        .iter()
        .map(|summary| {
            let level = scale_level(summary.count, max);
            VisualUnit {
                key: summary.key,
                count: summary.count,
                level,
                class_name: format!("color-scale-{level}"),
                tooltip: tooltip(summary),
            }
        })
        .collect()
}

fn shade(level: u8) -> char {
    SHADES[usize::from(level.min(LEVELS))]
}

/// Draws the units as a terminal grid followed by a legend.
#[must_use]
pub fn render(units: &[VisualUnit]) -> String {
    let mut out = String::new();

    let dates: HashMap<Date, u8> = units
        .iter()
        .filter_map(|unit| match unit.key {
            BucketKey::Date(date) => Some((date, unit.level)),
            BucketKey::Hour(_) => None,
        })
        .collect();

    if dates.is_empty() {
        render_hours(&mut out, units);
    } else {
        render_calendar(&mut out, &dates);
    }

    out.push_str("\nless ");
    for level in 0..=LEVELS {
        out.push(shade(level));
    }
    out.push_str(" more\n");

    out
}

fn render_hours(out: &mut String, units: &[VisualUnit]) {
    let hours: Vec<_> = units
        .iter()
        .filter_map(|unit| match unit.key {
            BucketKey::Hour(hour) => Some((hour, unit.level)),
            BucketKey::Date(_) => None,
        })
        .collect();

    if hours.is_empty() {
        out.push_str("no plays\n");
        return;
    }

    for (hour, _) in &hours {
        let _ = write!(out, "{hour:<3}");
    }
    out.push('\n');
    for (_, level) in &hours {
        let cell = shade(*level);
        let _ = write!(out, "{cell}{cell} ");
    }
    out.push('\n');
}

/// Columns are weeks starting on Monday, rows are weekdays.
fn render_calendar(out: &mut String, dates: &HashMap<Date, u8>) {
    let (Some(&first), Some(&last)) = (dates.keys().min(), dates.keys().max()) else {
        return;
    };

    let start = first - time::Duration::days(i64::from(first.weekday().number_days_from_monday()));
    let weeks = (last - start).whole_days() / 7 + 1;

    for (weekday, label) in (0_i64..).zip(WEEKDAYS) {
        let _ = write!(out, "{label:<4}");
        for week in 0..weeks {
            let date = start + time::Duration::days(week * 7 + weekday);
            let cell = if date < first || date > last {
                ' '
            } else {
                shade(dates.get(&date).copied().unwrap_or(0))
            };
            out.push(cell);
        }
        out.push('\n');
    }
}

//! Bucketed aggregation of play events.
//!
//! [`aggregate`] filters events to a [`TimeWindow`], groups them by a
//! [`Bucketing`] and reduces every group into a [`BucketSummary`] in a
//! single pass.
//!
//! Hourly output always holds 24 summaries, one per hour of the day in
//! ascending order, with zero-count placeholders for hours without plays.
//! Daily output holds one summary per date that had plays, in ascending
//! order.

use std::{borrow::Borrow, collections::HashMap, fmt, hash::Hash, time::Duration};

use time::{Date, OffsetDateTime, UtcOffset};

use crate::track::{PlayEvent, ARTIST_SEPARATOR};

/// How play timestamps are partitioned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Bucketing {
    /// One bucket per calendar date.
    #[default]
    Daily,
    /// One bucket per hour of the day.
    Hourly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Date(Date),
    /// Hour of the day, 0 through 23.
    Hour(u8),
}

impl Bucketing {
    pub const HOURS_PER_DAY: u8 = 24;

    /// The bucket `played_at` falls in, as seen from `offset`.
    #[must_use]
    pub fn key(self, played_at: OffsetDateTime, offset: UtcOffset) -> BucketKey {
        let local = played_at.to_offset(offset);
        match self {
            Self::Daily => BucketKey::Date(local.date()),
            Self::Hourly => BucketKey::Hour(local.hour()),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(
                f,
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            Self::Hour(hour) => write!(f, "{hour:02}:00"),
        }
    }
}

/// Half-open time window `[after, before)`.
///
/// An event exactly at `after` is inside, an event exactly at `before` is
/// not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub after: OffsetDateTime,
    pub before: OffsetDateTime,
}

impl TimeWindow {
    #[must_use]
    pub fn new(after: OffsetDateTime, before: OffsetDateTime) -> Self {
        Self { after, before }
    }

    /// The 24 hours up to `now`.
    #[must_use]
    pub fn trailing_day(now: OffsetDateTime) -> Self {
        Self::new(now - time::Duration::DAY, now)
    }

    /// From the start of `start` in `offset` up to `now`.
    #[must_use]
    pub fn since(start: Date, offset: UtcOffset, now: OffsetDateTime) -> Self {
        Self::new(start.midnight().assume_offset(offset), now)
    }

    #[must_use]
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.after <= instant && instant < self.before
    }
}

/// Occurrence counts in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally<K: Eq + Hash = String> {
    counts: Vec<(K, u32)>,
    index: HashMap<K, usize>,
}

impl<K> Tally<K>
where
    K: Clone + Eq + Hash,
{
    pub fn add<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(&i) = self.index.get(key) {
            self.counts[i].1 += 1;
        } else {
            self.index.insert(key.to_owned(), self.counts.len());
            self.counts.push((key.to_owned(), 1));
        }
    }

    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.index.get(key).map_or(0, |&i| self.counts[i].1)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }

    /// The key with the strictly highest count. Ties go to the key seen
    /// first.
    #[must_use]
    pub fn most_frequent(&self) -> Option<(&K, u32)> {
        self.iter().fold(None, |best, (key, count)| match best {
            Some((_, best_count)) if count <= best_count => best,
            _ => Some((key, count)),
        })
    }
}

/// Aggregate over the plays of one bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketSummary {
    pub key: BucketKey,
    pub count: u32,
    /// Plays per track name.
    pub tracks: Tally,
    /// Plays per artist combination. Keys are the credited names in order,
    /// so a name containing the display separator stays distinct.
    pub artists: Tally<Vec<String>>,
    pub total_duration: Duration,
}

impl BucketSummary {
    /// A summary without plays.
    #[must_use]
    pub fn empty(key: BucketKey) -> Self {
        Self {
            key,
            count: 0,
            tracks: Tally::default(),
            artists: Tally::default(),
            total_duration: Duration::ZERO,
        }
    }

    fn add(&mut self, event: &PlayEvent) {
        self.count += 1;
        self.tracks.add(event.track_name.as_str());
        self.artists.add(event.artists.as_slice());
        self.total_duration += event.duration;
    }

    #[must_use]
    pub fn most_played_track(&self) -> Option<&str> {
        self.tracks.most_frequent().map(|(track, _)| track.as_str())
    }

    #[must_use]
    pub fn most_played_artist(&self) -> Option<String> {
        self.artists
            .most_frequent()
            .map(|(artists, _)| artists.join(ARTIST_SEPARATOR))
    }

    #[must_use]
    pub fn unique_tracks(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn unique_artists(&self) -> usize {
        self.artists.len()
    }

    /// Mean play duration; `None` without plays.
    #[must_use]
    pub fn average_duration(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.total_duration / self.count)
    }
}

/// Groups the events inside `window` into buckets.
///
/// Buckets are computed in `offset`, so the same instant may fall on
/// different dates or hours depending on where the listener lives.
#[must_use]
pub fn aggregate(
    events: &[PlayEvent],
    bucketing: Bucketing,
    window: &TimeWindow,
    offset: UtcOffset,
) -> Vec<BucketSummary> {
    let mut buckets: HashMap<BucketKey, BucketSummary> = HashMap::new();
    if bucketing == Bucketing::Hourly {
        for hour in 0..Bucketing::HOURS_PER_DAY {
            let key = BucketKey::Hour(hour);
            buckets.insert(key, BucketSummary::empty(key));
        }
    }

    let mut excluded = 0_usize;
    for event in events {
        if !window.contains(event.played_at) {
            excluded += 1;
            continue;
        }

        let key = bucketing.key(event.played_at, offset);
        buckets
            .entry(key)
            .or_insert_with(|| BucketSummary::empty(key))
            .add(event);
    }

    if excluded > 0 {
        trace!("{excluded} events outside {window:?}");
    }

    let mut summaries: Vec<_> = buckets.into_values().collect();
    summaries.sort_unstable_by_key(|summary| summary.key);
    summaries
}

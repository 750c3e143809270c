//! Play events.
//!
//! A [`PlayEvent`] is one track having been played at some moment, as
//! reported by the play history. Events are never mutated after they were
//! received.

use std::{fmt, time::Duration};

use time::OffsetDateTime;

/// Separator between artist names when a combination is displayed.
pub const ARTIST_SEPARATOR: &str = ", ";

/// Unix timestamp of `datetime` in milliseconds.
#[must_use]
pub fn unix_millis(datetime: OffsetDateTime) -> i64 {
    // Nanoseconds since epoch fit in i128; millisecond values fit in i64
    // for any date the catalog can report.
    #[allow(clippy::cast_possible_truncation)]
    let millis = (datetime.unix_timestamp_nanos() / 1_000_000) as i64;
    millis
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayEvent {
    /// Catalog id; absent for local files.
    pub track_id: Option<String>,
    pub track_name: String,
    /// Artist names in the order the catalog credits them.
    pub artists: Vec<String>,
    pub duration: Duration,
    pub played_at: OffsetDateTime,
}

impl PlayEvent {
    /// The artist combination of this play for display, e.g.
    /// `"Simon, Garfunkel"`.
    #[must_use]
    pub fn artist_names(&self) -> String {
        self.artists.join(ARTIST_SEPARATOR)
    }

    /// Unix timestamp of the play in milliseconds.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        unix_millis(self.played_at)
    }
}

impl fmt::Display for PlayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist_names(), self.track_name)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn display_and_keys() {
        let event = PlayEvent {
            track_id: Some("t1".to_owned()),
            track_name: "The Boxer".to_owned(),
            artists: vec!["Simon".to_owned(), "Garfunkel".to_owned()],
            duration: Duration::from_secs(308),
            played_at: datetime!(2024-05-01 10:05:12.345 UTC),
        };

        assert_eq!(event.artist_names(), "Simon, Garfunkel");
        assert_eq!(event.to_string(), "Simon, Garfunkel - The Boxer");
        assert_eq!(event.timestamp_millis(), 1_714_557_912_345);
    }
}

//! Recently-played history response.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "items": [{
//!         "track": {
//!             "id": "4iV5W9uYEdYUVa79Axb7Rh",
//!             "name": "Sweet Disposition",
//!             "duration_ms": 233000,
//!             "artists": [{ "id": "...", "name": "The Temper Trap" }]
//!         },
//!         "played_at": "2024-05-01T10:05:12.345Z"
//!     }],
//!     "next": "https://api.spotify.com/v1/me/player/recently-played?before=...",
//!     "cursors": { "after": "1714557912345", "before": "1714550000000" },
//!     "limit": 50
//! }
//! ```
//!
//! Items are ordered newest first.

use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds};
use time::OffsetDateTime;

use crate::track::PlayEvent;

/// One page of play history.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<PlayHistory>,
    pub next: Option<String>,
    pub cursors: Option<Cursors>,
    pub limit: Option<u32>,
}

/// Unix millisecond cursors bracketing a page.
#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct Cursors {
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub after: Option<i64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub before: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlayHistory {
    pub track: Track,
    #[serde(with = "time::serde::rfc3339")]
    pub played_at: OffsetDateTime,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration_ms: Duration,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Artist {
    pub name: String,
}

impl From<PlayHistory> for PlayEvent {
    fn from(item: PlayHistory) -> Self {
        Self {
            track_id: item.track.id,
            track_name: item.track.name,
            artists: item.track.artists.into_iter().map(|a| a.name).collect(),
            duration: item.track.duration_ms,
            played_at: item.played_at,
        }
    }
}

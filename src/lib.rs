//! Listening heatmap for the Spotify recently-played history.
//!
//! The crate runs one linear cycle:
//!
//! 1. [`credential`] recalls a stored token or takes one from the redirect
//!    of the implicit grant flow;
//! 2. [`history`] fetches play events through an [`http::Transport`];
//! 3. [`aggregate`] buckets them by day or by hour of day;
//! 4. [`heatmap`] turns the buckets into color-scaled cells with tooltips.
//!
//! [`session::Session`] wires these together.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod aggregate;
pub mod config;
pub mod credential;
pub mod error;
pub mod heatmap;
pub mod history;
pub mod http;
pub mod protocol;
pub mod session;
pub mod track;

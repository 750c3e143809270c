//! Error handling for playheat.
//!
//! Every fallible operation in this crate returns an [`Error`] that pairs a
//! coarse [`ErrorKind`] with the underlying error. The kinds follow the
//! failure taxonomy of the fetch cycle:
//!
//! * [`ErrorKind::CredentialMissing`] - no token available, drives login
//! * [`ErrorKind::CredentialExpired`] - remote answered 401 Unauthorized
//! * [`ErrorKind::FetchFailed`] - remote answered any other non-2xx status
//! * [`ErrorKind::Transport`] - the request never produced a response
//!
//! The remaining kinds cover local failures such as unreadable files or
//! malformed settings.
//!
//! # Example
//!
//! ```rust
//! use playheat::error::{Error, ErrorKind, Result};
//!
//! fn check(status: http::StatusCode) -> Result<()> {
//!     if status == http::StatusCode::UNAUTHORIZED {
//!         return Err(Error::credential_expired("token rejected"));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for playheat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// No credential is persisted and none was handed over by a redirect.
    #[error("no credential available")]
    CredentialMissing,

    /// HTTP Mapping: 401 Unauthorized
    #[error("credential expired")]
    CredentialExpired,

    /// Any non-success HTTP status other than 401.
    #[error("fetch failed")]
    FetchFailed,

    /// Connection, timeout or body failures.
    #[error("transport error")]
    Transport,

    #[error("invalid argument specified")]
    InvalidArgument,

    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("internal error")]
    Internal,

    #[error("unknown error")]
    Unknown,
}

/// A non-success HTTP status returned by the remote API.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("unexpected HTTP status {0}")]
pub struct UnexpectedStatus(pub StatusCode);

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// The HTTP status carried by a [`ErrorKind::FetchFailed`] error.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.downcast::<UnexpectedStatus>().map(|status| status.0)
    }

    pub fn credential_missing<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::CredentialMissing, error)
    }

    /// Creates an error for a credential the remote rejected.
    ///
    /// The caller is expected to purge the stored credential and fall back
    /// to the unauthenticated state.
    pub fn credential_expired<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::CredentialExpired, error)
    }

    /// Creates an error for a non-success HTTP status.
    ///
    /// `401 Unauthorized` is classified as [`ErrorKind::CredentialExpired`]
    /// and every other status as [`ErrorKind::FetchFailed`].
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Self::credential_expired(UnexpectedStatus(status))
        } else {
            Self::new(ErrorKind::FetchFailed, UnexpectedStatus(status))
        }
    }

    pub fn transport<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Transport, error)
    }

    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }

    /// Whether this error means the credential is gone or no longer valid.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::CredentialMissing | ErrorKind::CredentialExpired
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrNotAvailable | ConnectionRefused | NotConnected | BrokenPipe
            | ConnectionReset | ConnectionAborted | TimedOut | UnexpectedEof => {
                Self::transport(err)
            }
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// * Decode errors -> `InvalidArgument`
/// * Builder errors -> `Internal`
/// * Status errors -> `CredentialExpired` or `FetchFailed`
/// * Connect, timeout, body and redirect errors -> `Transport`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if let Some(status) = err.status() {
            return Self::from_status(status);
        }

        Self::transport(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::internal(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<http::header::MaxSizeReached> for Error {
    fn from(e: http::header::MaxSizeReached) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<time::error::Parse> for Error {
    fn from(e: time::error::Parse) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<time::error::ComponentRange> for Error {
    fn from(e: time::error::ComponentRange) -> Self {
        Self::invalid_argument(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_credential_expired() {
        let err = Error::from_status(StatusCode::UNAUTHORIZED);
        assert_eq!(err.kind, ErrorKind::CredentialExpired);
        assert!(err.is_credential_error());
    }

    #[test]
    fn other_statuses_are_fetch_failures() {
        let err = Error::from_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind, ErrorKind::FetchFailed);
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!err.is_credential_error());
    }

    #[test]
    fn display_shows_kind_and_details() {
        let err = Error::from_status(StatusCode::BAD_GATEWAY);
        assert_eq!(
            err.to_string(),
            "fetch failed: unexpected HTTP status 502 Bad Gateway"
        );
    }

    #[test]
    fn io_timeouts_are_transport_errors() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(err.kind, ErrorKind::Transport);
    }
}

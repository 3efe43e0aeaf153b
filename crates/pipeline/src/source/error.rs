//! Error types for the [`source`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A source error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The two ways fetching a strip can fail, as far as the pipeline cares.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient: the transport failed, timed out, or the server hiccuped.
    #[display("network error")]
    Network,
    /// Permanent: the manga or chapter does not exist at the source.
    #[display("chapter not found")]
    NotFound,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Storage underneath the cache failed. The underlying storage error is
    /// attached as a child of the error tree.
    #[display("cache storage error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A cache container is malformed, or the pages handed to the cache are.
    #[display("invalid cache entry: {_0}")]
    InvalidEntry(#[error(not(source))] String),
    /// A manga identifier or chapter number failed validation.
    #[display("invalid identifier: {_0:?}")]
    InvalidId(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Cache failures are never retried automatically: the pipeline reports
    /// them as fatal.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::state::Failure;
use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The chapter could not be processed; the same failure is recorded as
    /// its [`ChapterState::Failed`](crate::ChapterState::Failed) state.
    #[display("{_0}")]
    Failed(#[error(not(source))] Failure),
    /// The run was cancelled before it finished. Nothing was cached and the
    /// chapter can be requested again.
    #[display("chapter processing was cancelled")]
    Cancelled,
    /// Reading the cache failed while looking for an existing entry.
    #[display("cache lookup failed")]
    Cache,
    /// The source could not list a manga's chapters.
    #[display("chapter listing failed")]
    Source,
    /// The pipeline settings are unusable.
    #[display("invalid pipeline configuration")]
    InvalidConfig,
}

impl ErrorKind {
    /// Returns `true` if requesting the chapter again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed(failure) => failure.is_retryable(),
            Self::Cancelled | Self::Source => true,
            Self::Cache | Self::InvalidConfig => false,
        }
    }

    /// The recorded failure, if this error is one.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

//! Segmentation Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A segmentation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for segmentation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The strip has no parts, or a part has no bytes.
    #[display("strip is empty")]
    EmptyInput,
    /// A part could not be decoded as an image. A fresh download may fix it.
    #[display("undecodable strip part {_0}")]
    Decode(#[error(not(source))] usize),
    /// The decoded strip is shorter than the minimum page height.
    #[display("strip height {height}px is below the minimum page height {min}px")]
    TooSmall { height: u32, min: u32 },
    /// The segmentation settings contradict each other.
    #[display("invalid segmentation config: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    /// A page could not be encoded.
    #[display("failed to encode page {_0}")]
    Encode(#[error(not(source))] usize),
    /// The caller asked for the work to stop.
    #[display("segmentation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying (with a freshly fetched strip) might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_) | Self::Cancelled)
    }
}

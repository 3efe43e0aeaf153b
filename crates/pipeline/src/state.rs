//! Per-chapter processing state.

use derive_more::Display;

/// Why a chapter could not be processed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The strip could not be downloaded (transport error or timeout).
    #[display("network")]
    Network,
    /// The source has no such chapter.
    #[display("not found")]
    NotFound,
    /// The strip downloaded but could not be cut into pages.
    #[display("segmentation")]
    Segmentation,
    /// The pages could not be written to the cache.
    #[display("cache")]
    CacheIo,
}
impl FailureKind {
    /// Returns `true` if processing the chapter again might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Segmentation)
    }
}

/// A terminal processing failure, as recorded in [`ChapterState::Failed`].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{kind} failure: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}
impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Where a chapter is in its lifecycle.
///
/// ```text
/// Unprocessed ─▶ Fetching ─▶ Segmenting ─▶ Cached
///                   │            │
///                   └────────────┴─▶ Failed
/// ```
/// A retryable failure goes back to `Fetching` on an explicit retry or a
/// foreground request; a non-retryable one stays put until the chapter is
/// invalidated. A cancelled run puts the chapter back to `Unprocessed`.
#[derive(Debug, Display, Clone, Default, PartialEq, Eq)]
pub enum ChapterState {
    #[default]
    #[display("unprocessed")]
    Unprocessed,
    #[display("fetching")]
    Fetching,
    #[display("segmenting")]
    Segmenting,
    #[display("cached")]
    Cached,
    #[display("failed ({_0})")]
    Failed(Failure),
}
impl ChapterState {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// `true` while a run is actively working on the chapter.
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Fetching | Self::Segmenting)
    }
}

/// Who is waiting for a chapter.
///
/// Foreground work is what the reader is looking at right now; it never waits
/// behind background work and is never cancelled by the prefetcher.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    #[display("background")]
    Background,
    #[display("foreground")]
    Foreground,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::Network.is_retryable());
        assert!(FailureKind::Segmentation.is_retryable());
        assert!(!FailureKind::NotFound.is_retryable());
        assert!(!FailureKind::CacheIo.is_retryable());
    }

    #[test]
    fn display() {
        let state = ChapterState::Failed(Failure::new(FailureKind::NotFound, "no chapter 13"));
        assert_eq!(state.to_string(), "failed (not found failure: no chapter 13)");
        assert_eq!(ChapterState::default().to_string(), "unprocessed");
    }

    #[test]
    fn foreground_outranks_background() {
        assert!(Priority::Foreground > Priority::Background);
    }
}

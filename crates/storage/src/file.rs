//! File metadata returned by storage backends.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// File metadata returned by listing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
        }
    }

    /// The final path component as UTF-8, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// The path relative to `base`, if the file lives underneath it.
    pub fn relative_to(&self, base: impl AsRef<Path>) -> Option<&Path> {
        self.path.strip_prefix(base).ok()
    }
}

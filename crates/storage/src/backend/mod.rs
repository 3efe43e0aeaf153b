//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, a unified interface for
//! the handful of operations the chapter cache and the strip library need:
//! listing, whole-file reads and writes, and directory-level rename/delete
//! (the cache publishes a chapter by renaming a staged directory into place).

mod filter;
mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::filter::ImageOnlyBackend;
pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous so they can sit on the same
/// runtime as the fetch and processing work without blocking it.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Directories
/// Directories are implicit: writing `a/b/file` creates `a/b`. The only
/// operations that address directories directly are [`exists`](Self::exists),
/// [`rename`](Self::rename) and [`delete_dir`](Self::delete_dir).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use folio_storage::{backend::StorageBackend, error::Result};
///
/// async fn page_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("solo-leveling/12/page_0000.png");
///     if backend.exists(path).await? {
///         Ok(backend.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend; used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata of every file (never directories) underneath an
    /// optional prefix. Prefix matching is component-based: the prefix
    /// `manga/1` matches `manga/1/page.png` but not `manga/12/page.png`.
    ///
    /// A prefix that does not exist yields an empty stream, not an error.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use folio_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("solo-leveling")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file or directory exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, creating parent directories as needed and
    /// overwriting any existing file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a directory and everything underneath it.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// directory does not exist.
    async fn delete_dir(&self, path: &Path) -> Result<()>;

    /// Rename a file or a whole directory within the same backend, creating
    /// the destination's parent directories as needed.
    ///
    /// The rename is a single indivisible step: observers see either the
    /// source or the destination, never a mixture.
    ///
    /// # Errors
    /// - [`NotFound`](crate::error::ErrorKind::NotFound) if the source does
    ///   not exist.
    /// - [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) if the
    ///   destination is a directory that already has contents.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use folio_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.rename(Path::new(".staging/solo-leveling/12.1"), Path::new("solo-leveling/12")).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

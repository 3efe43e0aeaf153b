//! Image-filtered storage backend decorator.
//!
//! Wraps another backend and restricts file operations to raster image
//! files, so a strip library directory can hold notes, covers-as-PDF or
//! `.DS_Store` litter without any of it being mistaken for a strip part.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{BackendHandle, StorageBackend, error::Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;

/// Extensions (lowercase) of the formats the segmenter can decode.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Check if a path names an image file by extension (case-insensitive).
fn is_image_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Image-filtered storage backend.
///
/// Listing silently skips non-image files; reading, writing, deleting or
/// renaming a non-image path returns `ErrorKind::FilteredPath`. Directory
/// checks ([`exists`](StorageBackend::exists) on a directory) pass through.
#[derive(Clone)]
pub struct ImageOnlyBackend {
    inner: BackendHandle,
}
impl ImageOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    fn gate(path: &Path) -> Result<()> {
        if !is_image_path(path) {
            exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ImageOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(self.inner.list_stream(prefix).filter(|item| {
            std::future::ready(match item {
                Ok(info) => is_image_path(&info.path),
                Err(_) => true, // propagate errors
            })
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Self::gate(path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        Self::gate(path)?;
        self.inner.write(path, data).await
    }

    async fn delete_dir(&self, path: &Path) -> Result<()> {
        // Removing a directory would take the filtered-out files with it.
        exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Self::gate(from)?;
        Self::gate(to)?;
        self.inner.rename(from, to).await
    }
}

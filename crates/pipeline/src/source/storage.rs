use crate::source::ChapterSource;
use crate::source::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use folio_cache::{ChapterNumber, ChapterRef, MangaId};
use folio_segment::RawStrip;
use folio_storage::error::Result as StorageResult;
use folio_storage::{BackendHandle, FileInfo};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Missing paths are permanent; anything else the storage layer reports is
/// treated like a flaky connection.
fn classify<T>(result: StorageResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let kind = if err.is_not_found() { ErrorKind::NotFound } else { ErrorKind::Network };
            Err(err).or_raise(|| kind)
        },
    }
}

/// A [`ChapterSource`] reading strips from a storage backend laid out as
/// `<manga>/<chapter>/<part files>`.
///
/// Parts are stacked in file-name order, so `001.png`, `002.png`, … work as
/// expected. Chapter directories are matched by number, which means `012`
/// and `12` name the same chapter. Pair it with
/// [`ImageOnlyBackend`](folio_storage::backend::ImageOnlyBackend) to ignore
/// anything in the tree that is not an image.
pub struct StorageSource {
    backend: BackendHandle,
}
impl StorageSource {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    /// Chapter directories of a manga keyed by the number they parse to.
    /// Directories that aren't chapter numbers are ignored.
    async fn chapter_dirs(&self, manga: &MangaId) -> Result<BTreeMap<ChapterNumber, PathBuf>> {
        let base = Path::new(manga.as_str());
        let files = classify(self.backend.list(Some(base)).await)?;
        let mut dirs = BTreeMap::new();
        for file in &files {
            let Some(name) = file.relative_to(base).and_then(|rest| rest.components().next()) else {
                continue;
            };
            // A file directly inside the manga directory is not a chapter.
            if file.path == base.join(name) {
                continue;
            }
            let Some(number) = name.as_os_str().to_str().and_then(|n| n.parse::<ChapterNumber>().ok()) else {
                continue;
            };
            dirs.entry(number).or_insert_with(|| base.join(name));
        }
        Ok(dirs)
    }

    async fn parts(&self, dir: &Path) -> Result<Vec<FileInfo>> {
        let mut parts = classify(self.backend.list(Some(dir)).await)?;
        parts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(parts)
    }
}

#[async_trait]
impl ChapterSource for StorageSource {
    fn name(&self) -> &str {
        self.backend.name()
    }

    #[tracing::instrument(skip_all, fields(chapter = %chapter, parts))]
    async fn fetch_strip(&self, chapter: &ChapterRef) -> Result<RawStrip> {
        let mut parts = self.parts(&chapter.relative_path()).await?;
        if parts.is_empty() {
            // The directory may be spelled differently (`012` for `12`).
            if let Some(dir) = self.chapter_dirs(&chapter.manga).await?.remove(&chapter.chapter) {
                parts = self.parts(&dir).await?;
            }
        }
        if parts.is_empty() {
            exn::bail!(ErrorKind::NotFound);
        }
        tracing::Span::current().record("parts", parts.len());

        let reads = parts.iter().map(|part| async move { classify(self.backend.read(&part.path).await) });
        let bytes = futures::future::try_join_all(reads).await?;
        Ok(RawStrip::from_parts(bytes))
    }

    async fn chapters(&self, manga: &MangaId) -> Result<Vec<ChapterNumber>> {
        let dirs = self.chapter_dirs(manga).await?;
        if dirs.is_empty() && !classify(self.backend.exists(Path::new(manga.as_str())).await)? {
            exn::bail!(ErrorKind::NotFound);
        }
        Ok(dirs.into_keys().collect())
    }
}

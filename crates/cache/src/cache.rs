use crate::error::{ErrorKind, Result};
use crate::models::{ChapterNumber, ChapterRef, MangaId};
use exn::{OptionExt, ResultExt};
use folio_segment::Page;
use folio_storage::{BackendHandle, FileInfo};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";
const PAGE_PREFIX: &str = "page_";
const PAGE_EXTENSION: &str = ".png";
const READ_ATTEMPTS: usize = 3;

fn page_file_name(index: usize) -> String {
    format!("{PAGE_PREFIX}{index:04}{PAGE_EXTENSION}")
}

fn parse_page_file_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(PAGE_PREFIX)?.strip_suffix(PAGE_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Durable store of segmented chapters.
///
/// Every chapter lives in its own container, `<manga>/<chapter>/`, holding
/// `page_0000.png`, `page_0001.png` and so on. A container is either absent
/// or complete: pages are written into a private staging directory first and
/// the finished directory is renamed into place in one step. An older
/// container is moved out of the way into `.trash` before the rename and
/// deleted afterwards.
///
/// Writers (publishing and invalidation) are serialized within one cache
/// instance; readers never wait.
pub struct ChapterCache {
    backend: BackendHandle,
    writer: Mutex<()>,
    nonce: AtomicU64,
}
impl ChapterCache {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            writer: Mutex::new(()),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    /// Path of a cached page, relative to the backend root.
    pub fn page_path(chapter: &ChapterRef, index: usize) -> PathBuf {
        chapter.relative_path().join(page_file_name(index))
    }

    /// A name that no other writer, in this process or any other, will pick.
    fn unique_suffix(&self, chapter: &ChapterRef) -> String {
        let sequence = self.nonce.fetch_add(1, Ordering::Relaxed);
        let now = UtcDateTime::now().unix_timestamp_nanos();
        format!("{}.{:x}-{:x}-{sequence}", chapter.chapter, now, std::process::id())
    }

    fn scratch_path(&self, dir: &str, chapter: &ChapterRef) -> PathBuf {
        Path::new(dir).join(chapter.manga.as_str()).join(self.unique_suffix(chapter))
    }

    pub async fn has(&self, chapter: &ChapterRef) -> Result<bool> {
        let path = chapter.relative_path();
        self.backend.exists(&path).await.or_raise(|| ErrorKind::Io(path))
    }

    /// Read every page of a cached chapter, in page order.
    ///
    /// Returns `None` when the chapter is not cached, including when the
    /// container disappears halfway through reading (a concurrent
    /// [`invalidate`](Self::invalidate)). The container is listed again after
    /// reading; if it was replaced in the meantime the read starts over.
    #[instrument(skip_all, fields(chapter = %chapter))]
    pub async fn get(&self, chapter: &ChapterRef) -> Result<Option<Vec<Page>>> {
        let dir = chapter.relative_path();
        for attempt in 1..=READ_ATTEMPTS {
            let files = self.list_entry(&dir).await?;
            if files.is_empty() {
                return Ok(None);
            }
            let read = self.read_entry(chapter, &files).await;
            if self.list_entry(&dir).await? == files {
                return read;
            }
            tracing::debug!(attempt, "cache entry replaced while reading");
        }
        Ok(None)
    }

    async fn list_entry(&self, dir: &Path) -> Result<Vec<FileInfo>> {
        let mut files = self.backend.list(Some(dir)).await.or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn read_entry(&self, chapter: &ChapterRef, files: &[FileInfo]) -> Result<Option<Vec<Page>>> {
        let mut indexed = Vec::with_capacity(files.len());
        for file in files {
            let index = file.file_name().and_then(parse_page_file_name).ok_or_raise(|| {
                ErrorKind::InvalidEntry(format!("unexpected file {} in {chapter}", file.path.display()))
            })?;
            indexed.push((index, &file.path));
        }
        indexed.sort();
        if indexed.iter().enumerate().any(|(expected, (index, _))| *index != expected) {
            exn::bail!(ErrorKind::InvalidEntry(format!("pages of {chapter} are not contiguous")));
        }

        let mut pages = Vec::with_capacity(indexed.len());
        for (index, path) in indexed {
            let bytes = match self.backend.read(path).await {
                Ok(bytes) => bytes,
                Err(err) if err.is_not_found() => {
                    tracing::debug!(page = index, "page vanished while reading, treating as a miss");
                    return Ok(None);
                },
                Err(err) => return Err(err).or_raise(|| ErrorKind::Io(path.clone())),
            };
            let (width, height) = image::ImageReader::with_format(Cursor::new(&bytes), image::ImageFormat::Png)
                .into_dimensions()
                .or_raise(|| ErrorKind::InvalidEntry(format!("page {} is not a PNG", path.display())))?;
            pages.push(Page { index, width, height, bytes });
        }
        Ok(Some(pages))
    }

    /// Publish the pages of a chapter, replacing any existing container.
    ///
    /// Pages must be non-empty and indexed `0..n` in order. Publishing the
    /// same pages twice leaves the same bytes behind.
    #[instrument(skip_all, fields(chapter = %chapter, pages = pages.len()))]
    pub async fn put(&self, chapter: &ChapterRef, pages: &[Page]) -> Result<()> {
        if pages.is_empty() {
            exn::bail!(ErrorKind::InvalidEntry(format!("refusing to cache {chapter} without pages")));
        }
        if pages.iter().enumerate().any(|(expected, page)| page.index != expected) {
            exn::bail!(ErrorKind::InvalidEntry(format!("pages of {chapter} are not indexed in order")));
        }

        let _writer = self.writer.lock().await;
        let staging = self.scratch_path(STAGING_DIR, chapter);
        if let Err(err) = self.stage(&staging, pages).await {
            self.discard(&staging).await;
            return Err(err);
        }

        let target = chapter.relative_path();
        let trash = self.scratch_path(TRASH_DIR, chapter);
        let replaced = self.retire(&target, &trash).await?;
        if let Err(err) = self.backend.rename(&staging, &target).await {
            // Put the previous entry back so a failed publish changes nothing.
            if replaced && let Err(restore) = self.backend.rename(&trash, &target).await {
                tracing::warn!(error = ?restore, "could not restore the previous cache entry");
            }
            self.discard(&staging).await;
            return Err(err).or_raise(|| ErrorKind::Io(target));
        }
        if replaced {
            self.discard(&trash).await;
        }
        tracing::info!("published chapter to cache");
        Ok(())
    }

    async fn stage(&self, staging: &Path, pages: &[Page]) -> Result<()> {
        for page in pages {
            let path = staging.join(page_file_name(page.index));
            self.backend.write(&path, &page.bytes).await.or_raise(|| ErrorKind::Io(path))?;
        }
        Ok(())
    }

    /// Move a published container out of sight. Returns `false` if there
    /// was nothing to move.
    async fn retire(&self, target: &Path, trash: &Path) -> Result<bool> {
        match self.backend.rename(target, trash).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err).or_raise(|| ErrorKind::Io(target.to_path_buf())),
        }
    }

    async fn discard(&self, dir: &Path) {
        if let Err(err) = self.backend.delete_dir(dir).await
            && !err.is_not_found()
        {
            tracing::warn!(path = %dir.display(), error = ?err, "could not remove scratch directory");
        }
    }

    /// Remove a chapter's container. Removing a chapter that is not cached
    /// is not an error.
    #[instrument(skip_all, fields(chapter = %chapter))]
    pub async fn invalidate(&self, chapter: &ChapterRef) -> Result<()> {
        let _writer = self.writer.lock().await;
        let target = chapter.relative_path();
        let trash = self.scratch_path(TRASH_DIR, chapter);
        if self.retire(&target, &trash).await? {
            self.discard(&trash).await;
            tracing::info!("invalidated cached chapter");
        }
        Ok(())
    }

    /// Chapter numbers of a manga that currently have a cache entry, in
    /// ascending order.
    pub async fn chapters(&self, manga: &MangaId) -> Result<Vec<ChapterNumber>> {
        let dir = PathBuf::from(manga.as_str());
        let files = self.backend.list(Some(&dir)).await.or_raise(|| ErrorKind::Io(dir.clone()))?;
        let chapters: BTreeSet<ChapterNumber> = files
            .iter()
            .filter_map(|file| file.relative_to(&dir)?.components().next())
            .filter_map(|component| component.as_os_str().to_str()?.parse().ok())
            .collect();
        Ok(chapters.into_iter().collect())
    }

    /// Delete whatever staging or trash directories a crashed process left
    /// behind. Call once at startup, before anything is published.
    pub async fn sweep_staging(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        for dir in [STAGING_DIR, TRASH_DIR] {
            match self.backend.delete_dir(Path::new(dir)).await {
                Ok(()) => tracing::info!(dir, "swept leftover scratch directory"),
                Err(err) if err.is_not_found() => {},
                Err(err) => return Err(err).or_raise(|| ErrorKind::Io(PathBuf::from(dir))),
            }
        }
        Ok(())
    }
}

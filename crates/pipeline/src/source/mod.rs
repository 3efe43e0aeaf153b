//! Where raw strips come from.
//!
//! The pipeline knows nothing about scraping or site protocols: anything
//! that can hand over the encoded parts of a chapter and list a manga's
//! chapters is a [`ChapterSource`]. [`StorageSource`] is the one shipped here,
//! reading strips out of a directory tree through a storage backend.

pub mod error;
mod storage;

pub use self::storage::StorageSource;
use crate::source::error::Result;
use async_trait::async_trait;
use folio_cache::{ChapterNumber, ChapterRef, MangaId};
use folio_segment::RawStrip;
use std::sync::Arc;

/// Fetch capability for raw strips.
///
/// Errors must be classified as
/// [`Network`](error::ErrorKind::Network) (worth retrying) or
/// [`NotFound`](error::ErrorKind::NotFound) (not worth retrying).
#[async_trait]
pub trait ChapterSource: Send + Sync {
    /// Name of the source; used for logging only.
    fn name(&self) -> &str;

    /// Download the encoded parts of one chapter, top to bottom.
    async fn fetch_strip(&self, chapter: &ChapterRef) -> Result<RawStrip>;

    /// Every chapter number the source has for a manga, in any order.
    async fn chapters(&self, manga: &MangaId) -> Result<Vec<ChapterNumber>>;
}

pub type SourceHandle = Arc<dyn ChapterSource>;

/// The ordered chapters of one manga, for navigation and window planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterList {
    manga: MangaId,
    chapters: Vec<ChapterNumber>,
}
impl ChapterList {
    /// Sorts and de-duplicates `chapters`.
    pub fn new(manga: MangaId, chapters: impl IntoIterator<Item = ChapterNumber>) -> Self {
        let mut chapters: Vec<_> = chapters.into_iter().collect();
        chapters.sort();
        chapters.dedup();
        Self { manga, chapters }
    }

    /// Ask a source for the chapters of `manga`.
    pub async fn fetch(source: &dyn ChapterSource, manga: &MangaId) -> Result<Self> {
        Ok(Self::new(manga.clone(), source.chapters(manga).await?))
    }

    pub fn manga(&self) -> &MangaId {
        &self.manga
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn contains(&self, chapter: &ChapterNumber) -> bool {
        self.chapters.binary_search(chapter).is_ok()
    }

    pub fn numbers(&self) -> &[ChapterNumber] {
        &self.chapters
    }

    pub fn iter(&self) -> impl Iterator<Item = ChapterRef> + '_ {
        self.chapters.iter().map(|number| self.reference(number))
    }

    fn reference(&self, number: &ChapterNumber) -> ChapterRef {
        ChapterRef::new(self.manga.clone(), number.clone())
    }

    /// The chapter after `chapter`, or the last one when there is nothing
    /// after it. `None` only for an empty list.
    pub fn next(&self, chapter: &ChapterNumber) -> Option<ChapterRef> {
        let after = self.chapters.partition_point(|c| c <= chapter);
        self.chapters.get(after).or(self.chapters.last()).map(|number| self.reference(number))
    }

    /// The chapter before `chapter`, or the first one when there is nothing
    /// before it. `None` only for an empty list.
    pub fn previous(&self, chapter: &ChapterNumber) -> Option<ChapterRef> {
        let before = self.chapters.partition_point(|c| c < chapter);
        let index = before.saturating_sub(1);
        self.chapters.get(index).map(|number| self.reference(number))
    }

    /// Up to `count` chapters following `chapter`, in reading order.
    pub fn following(&self, chapter: &ChapterNumber, count: usize) -> Vec<ChapterRef> {
        let after = self.chapters.partition_point(|c| c <= chapter);
        self.chapters[after..].iter().take(count).map(|number| self.reference(number)).collect()
    }

    /// Every chapter except `chapter`, nearest first: those after it in
    /// ascending order, then those before it in descending order.
    pub fn nearest_first(&self, chapter: &ChapterNumber) -> Vec<ChapterRef> {
        let after = self.chapters.partition_point(|c| c <= chapter);
        let before = self.chapters.partition_point(|c| c < chapter);
        self.chapters[after..]
            .iter()
            .chain(self.chapters[..before].iter().rev())
            .map(|number| self.reference(number))
            .collect()
    }
}

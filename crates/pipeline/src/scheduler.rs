//! Look-ahead processing around the chapter being read.

use crate::error::{ErrorKind, Result};
use crate::pipeline::ChapterProcessingPipeline;
use crate::source::ChapterList;
use crate::state::ChapterState;
use exn::{OptionExt, ResultExt};
use folio_cache::{ChapterRef, MangaId};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::instrument;

#[derive(Default)]
struct Window {
    current: Option<ChapterRef>,
    chapters: Vec<ChapterRef>,
    /// Set by [`PrefetchScheduler::prefetch_all`] until the reader moves to
    /// another manga.
    everything: Option<MangaId>,
    lists: HashMap<MangaId, ChapterList>,
}

/// Keeps the chapters after the current one processed in the background.
///
/// The window is either the next `window_size` chapters or, after
/// [`prefetch_all`](Self::prefetch_all), every chapter of the manga nearest
/// first. Chapters that drop out of the window have their background runs
/// cancelled; chapters that are already cached or failed are left alone.
pub struct PrefetchScheduler {
    pipeline: ChapterProcessingPipeline,
    window_size: usize,
    window: Mutex<Window>,
}
impl PrefetchScheduler {
    pub fn new(pipeline: ChapterProcessingPipeline, window_size: usize) -> Self {
        Self {
            pipeline,
            window_size,
            window: Mutex::new(Window::default()),
        }
    }

    pub fn pipeline(&self) -> &ChapterProcessingPipeline {
        &self.pipeline
    }

    pub async fn current(&self) -> Option<ChapterRef> {
        self.window.lock().await.current.clone()
    }

    /// The chapters currently being kept ready, in submission order.
    pub async fn window(&self) -> Vec<ChapterRef> {
        self.window.lock().await.chapters.clone()
    }

    /// The reader moved to `chapter`. Returns the new window.
    ///
    /// This does not process `chapter` itself; open it in the foreground.
    #[instrument(skip_all, fields(chapter = %chapter))]
    pub async fn set_current_chapter(&self, chapter: &ChapterRef) -> Result<Vec<ChapterRef>> {
        let mut window = self.window.lock().await;
        if window.everything.as_ref().is_some_and(|manga| *manga != chapter.manga) {
            tracing::debug!("left prefetch-all manga");
            window.everything = None;
        }
        window.current = Some(chapter.clone());
        let everything = window.everything.is_some();
        let chapters = {
            let list = self.list(&mut window, &chapter.manga, Some(chapter)).await?;
            if everything {
                list.nearest_first(&chapter.chapter)
            } else {
                list.following(&chapter.chapter, self.window_size)
            }
        };
        self.replace(&mut window, chapters.clone());
        drop(window);
        self.submit(&chapters).await;
        Ok(chapters)
    }

    /// Keep every chapter of `manga` processed, nearest to the current
    /// chapter first (or in reading order if the reader is elsewhere).
    #[instrument(skip_all, fields(manga = %manga))]
    pub async fn prefetch_all(&self, manga: &MangaId) -> Result<Vec<ChapterRef>> {
        let mut window = self.window.lock().await;
        window.everything = Some(manga.clone());
        let current = window.current.clone().filter(|current| current.manga == *manga);
        let chapters = {
            let list = self.list(&mut window, manga, current.as_ref()).await?;
            match &current {
                Some(current) => list.nearest_first(&current.chapter),
                None => list.iter().collect(),
            }
        };
        self.replace(&mut window, chapters.clone());
        drop(window);
        self.submit(&chapters).await;
        Ok(chapters)
    }

    /// The manga's chapter list, fetched again if `chapter` is not on it.
    async fn list<'w>(
        &self,
        window: &'w mut Window,
        manga: &MangaId,
        chapter: Option<&ChapterRef>,
    ) -> Result<&'w ChapterList> {
        let stale = match window.lists.get(manga) {
            Some(list) => chapter.is_some_and(|chapter| !list.contains(&chapter.chapter)),
            None => true,
        };
        if stale {
            let list = ChapterList::fetch(&**self.pipeline.source(), manga).await.or_raise(|| ErrorKind::Source)?;
            tracing::debug!(chapters = list.len(), "listed chapters");
            window.lists.insert(manga.clone(), list);
        }
        window.lists.get(manga).ok_or_raise(|| ErrorKind::Source)
    }

    /// Install a new window, cancelling whatever fell out of it.
    fn replace(&self, window: &mut Window, chapters: Vec<ChapterRef>) {
        for old in &window.chapters {
            if chapters.contains(old) || window.current.as_ref() == Some(old) {
                continue;
            }
            if self.pipeline.cancel(old) {
                tracing::debug!(chapter = %old, "cancelled prefetch");
            }
        }
        window.chapters = chapters;
    }

    /// Submit the window's chapters in order, without holding the window
    /// lock. Stops early once a newer window has replaced this one.
    async fn submit(&self, chapters: &[ChapterRef]) {
        for chapter in chapters {
            match self.pipeline.state(chapter) {
                ChapterState::Cached | ChapterState::Failed(_) => continue,
                _ => {},
            }
            match self.pipeline.prefetch(chapter).await {
                Ok(Some(_)) => tracing::debug!(%chapter, "prefetch submitted"),
                Ok(None) => tracing::trace!(%chapter, "already cached"),
                Err(err) => tracing::warn!(%chapter, error = ?err, "prefetch not submitted"),
            }
            let window = self.window.lock().await;
            if !window.chapters.contains(chapter) {
                // The window moved on while this chapter was being submitted.
                if window.current.as_ref() != Some(chapter) {
                    self.pipeline.cancel(chapter);
                }
                return;
            }
        }
    }
}

use crate::error::{ErrorKind, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::pool::WorkerPool;
use crate::registry::{Claim, InFlightRegistry, Lookup, Outcome, Pages, PendingChapter, Run};
use crate::retry::{self, FetchError, RetryPolicy};
use crate::source::SourceHandle;
use crate::state::{ChapterState, Failure, FailureKind, Priority};
use exn::ResultExt;
use folio_cache::{ChapterCache, ChapterRef};
use folio_config::Config;
use folio_segment::{SegmentConfig, error::ErrorKind as SegmentErrorKind};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::instrument;

/// Knobs for [`ChapterProcessingPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub segment: SegmentConfig,
    pub retry: RetryPolicy,
    /// Background runs allowed at once.
    pub workers: usize,
}
impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        let segment = &config.segment;
        Self {
            segment: SegmentConfig {
                min_page_height: segment.min_page_height,
                max_page_height: segment.max_page_height,
                blank_threshold: segment.blank_threshold,
                min_blank_rows: segment.min_blank_rows,
            },
            retry: RetryPolicy::from(&config.fetch),
            workers: config.prefetch.workers,
        }
    }
}

/// What [`request`](ChapterProcessingPipeline::request) hands back.
#[derive(Debug)]
pub enum Requested {
    /// The chapter was already cached.
    Ready(Pages),
    /// The chapter is being processed.
    Pending(PendingChapter),
}
impl Requested {
    pub async fn wait(self) -> Result<Pages> {
        match self {
            Self::Ready(pages) => Ok(pages),
            Self::Pending(pending) => pending.wait().await,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

struct Inner {
    source: SourceHandle,
    cache: Arc<ChapterCache>,
    registry: InFlightRegistry,
    pool: WorkerPool,
    segment: SegmentConfig,
    retry: RetryPolicy,
    events: EventBus,
}

/// Fetch → segment → cache, once per chapter no matter how many ask.
///
/// Cloning is cheap and every clone drives the same registry, pool and cache.
#[derive(Clone)]
pub struct ChapterProcessingPipeline {
    inner: Arc<Inner>,
}
impl ChapterProcessingPipeline {
    pub fn new(source: SourceHandle, cache: Arc<ChapterCache>, options: PipelineOptions) -> Result<Self> {
        options.segment.validate().or_raise(|| ErrorKind::InvalidConfig)?;
        if options.workers == 0 {
            exn::bail!(ErrorKind::InvalidConfig);
        }
        let events = EventBus::default();
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                cache,
                registry: InFlightRegistry::new(events.clone()),
                pool: WorkerPool::new(options.workers),
                segment: options.segment,
                retry: options.retry,
                events,
            }),
        })
    }

    pub fn source(&self) -> &SourceHandle {
        &self.inner.source
    }

    pub fn cache(&self) -> &Arc<ChapterCache> {
        &self.inner.cache
    }

    /// Ask for a chapter's pages.
    ///
    /// Joins the chapter's run if one is in flight (promoting it if this is a
    /// foreground request), returns the cached pages if there are any, and
    /// only then starts a new run. A chapter whose last run failed is not
    /// processed again unless the failure is retryable and the request is in
    /// the foreground; otherwise the recorded failure is returned.
    #[instrument(skip_all, fields(chapter = %chapter, priority = %priority))]
    pub async fn request(&self, chapter: &ChapterRef, priority: Priority) -> Result<Requested> {
        let registry = &self.inner.registry;
        loop {
            let known_cached = match registry.lookup(chapter, priority) {
                Lookup::Joined(pending) => return Ok(Requested::Pending(pending)),
                Lookup::Refused(failure) => exn::bail!(ErrorKind::Failed(failure)),
                Lookup::Idle { cached } => cached,
            };
            if let Some(pages) = self.inner.cache.get(chapter).await.or_raise(|| ErrorKind::Cache)? {
                registry.mark_cached(chapter);
                tracing::debug!("cache hit");
                return Ok(Requested::Ready(Arc::from(pages)));
            }
            if known_cached {
                // Removed behind our back; start over.
                registry.reset(chapter);
            }
            if let Some(pending) = self.start(chapter, priority)? {
                return Ok(Requested::Pending(pending));
            }
        }
    }

    /// Make sure a chapter is cached or being processed, in the background,
    /// without reading its pages.
    ///
    /// Returns `None` when the chapter is already cached.
    #[instrument(skip_all, fields(chapter = %chapter))]
    pub async fn prefetch(&self, chapter: &ChapterRef) -> Result<Option<PendingChapter>> {
        let registry = &self.inner.registry;
        loop {
            let known_cached = match registry.lookup(chapter, Priority::Background) {
                Lookup::Joined(pending) => return Ok(Some(pending)),
                Lookup::Refused(failure) => exn::bail!(ErrorKind::Failed(failure)),
                Lookup::Idle { cached } => cached,
            };
            if self.inner.cache.has(chapter).await.or_raise(|| ErrorKind::Cache)? {
                registry.mark_cached(chapter);
                return Ok(None);
            }
            if known_cached {
                registry.reset(chapter);
            }
            if let Some(pending) = self.start(chapter, Priority::Background)? {
                return Ok(Some(pending));
            }
        }
    }

    /// Join or start the chapter's run. `None` means another run cached the
    /// chapter since it was looked up.
    fn start(&self, chapter: &ChapterRef, priority: Priority) -> Result<Option<PendingChapter>> {
        match self.inner.registry.claim(chapter, priority) {
            Claim::Joined(pending) => Ok(Some(pending)),
            Claim::Refused(failure) => exn::bail!(ErrorKind::Failed(failure)),
            Claim::Cached => {
                tracing::debug!("cached by another run");
                Ok(None)
            },
            Claim::Started(run, pending) => {
                tracing::debug!(run = run.id, "starting run");
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let guard = Release { inner, run };
                    guard.inner.execute(&guard.run).await;
                });
                Ok(Some(pending))
            },
        }
    }

    /// Foreground request that waits for the pages.
    pub async fn open_chapter(&self, chapter: &ChapterRef) -> Result<Pages> {
        self.request(chapter, Priority::Foreground).await?.wait().await
    }

    /// Process a chapter whose last run failed with a retryable failure.
    pub async fn retry(&self, chapter: &ChapterRef) -> Result<Requested> {
        if let Err(failure) = self.inner.registry.clear_failure(chapter) {
            exn::bail!(ErrorKind::Failed(failure));
        }
        self.request(chapter, Priority::Foreground).await
    }

    /// Drop the chapter's cached pages and forget its state, including a
    /// non-retryable failure. A background run in flight is cancelled.
    pub async fn invalidate(&self, chapter: &ChapterRef) -> Result<()> {
        self.inner.registry.cancel(chapter);
        self.inner.cache.invalidate(chapter).await.or_raise(|| ErrorKind::Cache)?;
        self.inner.registry.reset(chapter);
        Ok(())
    }

    /// Cancel the chapter's run unless a foreground request is waiting on it.
    /// Never blocks; the run stops at its next checkpoint.
    pub fn cancel(&self, chapter: &ChapterRef) -> bool {
        self.inner.registry.cancel(chapter)
    }

    pub fn state(&self, chapter: &ChapterRef) -> ChapterState {
        self.inner.registry.state(chapter)
    }

    pub fn is_in_flight(&self, chapter: &ChapterRef) -> bool {
        self.inner.registry.is_in_flight(chapter)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once no run is executing.
    pub async fn settled(&self) {
        self.inner.registry.settled().await
    }
}

/// Releases the run even if its task panics or is dropped mid-flight.
struct Release {
    inner: Arc<Inner>,
    run: Arc<Run>,
}
impl Drop for Release {
    fn drop(&mut self) {
        self.inner.registry.release(&self.run);
    }
}

impl Inner {
    #[instrument(skip_all, fields(chapter = %run.chapter, run = run.id))]
    async fn execute(&self, run: &Run) {
        let outcome = self.process(run).await;
        match &outcome {
            Outcome::Ready(pages) => tracing::info!(pages = pages.len(), "chapter ready"),
            Outcome::Failed(failure) => match run.priority() {
                Priority::Background => tracing::warn!(%failure, "prefetch failed"),
                Priority::Foreground => tracing::error!(%failure, "chapter failed"),
            },
            Outcome::Cancelled => tracing::debug!("run cancelled"),
        }
        self.registry.finish(run, outcome);
    }

    async fn process(&self, run: &Run) -> Outcome {
        let cancel = &run.cancel;
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Outcome::Cancelled,
            permit = self.pool.acquire(run.watch_priority()) => match permit {
                Some(permit) => permit,
                None => return Outcome::Cancelled,
            },
        };

        self.registry.transition(run, ChapterState::Fetching);
        let strip = match retry::fetch(&*self.source, &run.chapter, &self.retry, cancel).await {
            Ok(strip) => strip,
            Err(FetchError::Cancelled) => return Outcome::Cancelled,
            Err(FetchError::Failed(failure)) => return Outcome::Failed(failure),
        };
        tracing::info!(parts = strip.parts().len(), bytes = strip.encoded_len(), "fetched strip");

        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        self.registry.transition(run, ChapterState::Segmenting);
        let segmented = {
            let config = self.segment.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || folio_segment::segment_with(&strip, &config, || cancel.is_cancelled()))
                .await
        };
        let pages = match segmented {
            Ok(Ok(pages)) => pages,
            Ok(Err(err)) if *err == SegmentErrorKind::Cancelled => return Outcome::Cancelled,
            Ok(Err(err)) => return Outcome::Failed(Failure::new(FailureKind::Segmentation, format!("{err:?}"))),
            Err(join) => {
                return Outcome::Failed(Failure::new(FailureKind::Segmentation, format!("segmentation aborted: {join}")));
            },
        };
        tracing::info!(pages = pages.len(), "segmented strip");

        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        if let Err(err) = self.cache.put(&run.chapter, &pages).await {
            return Outcome::Failed(Failure::new(FailureKind::CacheIo, format!("{err:?}")));
        }
        Outcome::Ready(Arc::from(pages))
    }
}

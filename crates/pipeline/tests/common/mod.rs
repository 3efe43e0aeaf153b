#![allow(dead_code)]

use async_trait::async_trait;
use folio_cache::{ChapterCache, ChapterNumber, ChapterRef, MangaId};
use folio_pipeline::source::error::{ErrorKind as SourceErrorKind, Result as SourceResult};
use folio_pipeline::{ChapterProcessingPipeline, ChapterSource, ChapterState, PipelineOptions, RetryPolicy};
use folio_segment::{RawStrip, SegmentConfig};
use folio_storage::backend::MockBackend;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, codecs::png::PngEncoder};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const STRIP_HEIGHT: u32 = 200;

pub fn manga(name: &str) -> MangaId {
    MangaId::new(name).unwrap()
}

pub fn chapter(manga_name: &str, number: u32) -> ChapterRef {
    ChapterRef::new(manga(manga_name), number)
}

/// A strip with no blank rows at all, so every cut is forced.
pub fn strip(seed: u32) -> RawStrip {
    let img = RgbImage::from_fn(16, STRIP_HEIGHT, |x, y| {
        let v = ((x * 7 + y * 13 + seed) % 251) as u8;
        Rgb([v, v, v])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    RawStrip::single(buf)
}

pub fn options(workers: usize) -> PipelineOptions {
    PipelineOptions {
        segment: SegmentConfig {
            min_page_height: 40,
            max_page_height: 80,
            blank_threshold: 4.0,
            min_blank_rows: 2,
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            timeout: Duration::from_secs(5),
        },
        workers,
    }
}

/// An in-memory source with scripted failures, per-chapter gates and fetch
/// counters.
pub struct FakeSource {
    listed: BTreeMap<MangaId, Vec<ChapterNumber>>,
    strips: HashMap<ChapterRef, RawStrip>,
    failures: Mutex<HashMap<ChapterRef, VecDeque<SourceErrorKind>>>,
    gated: Mutex<HashSet<ChapterRef>>,
    gate: Semaphore,
    fetches: Mutex<HashMap<ChapterRef, usize>>,
}
impl FakeSource {
    /// `manga` with chapters `numbers`, all fetchable.
    pub fn new(manga_name: &str, numbers: impl IntoIterator<Item = u32>) -> Self {
        Self::empty().with_manga(manga_name, numbers)
    }

    pub fn empty() -> Self {
        Self {
            listed: BTreeMap::new(),
            strips: HashMap::new(),
            failures: Mutex::default(),
            gated: Mutex::default(),
            gate: Semaphore::new(0),
            fetches: Mutex::default(),
        }
    }

    pub fn with_manga(mut self, manga_name: &str, numbers: impl IntoIterator<Item = u32>) -> Self {
        for number in numbers {
            let chapter = chapter(manga_name, number);
            self.strips.insert(chapter.clone(), strip(number));
            self.listed.entry(chapter.manga).or_default().push(chapter.chapter);
        }
        self
    }

    /// Listed, but fetching it reports `NotFound`.
    pub fn missing(mut self, chapter: &ChapterRef) -> Self {
        self.strips.remove(chapter);
        self
    }

    pub fn with_strip(mut self, chapter: &ChapterRef, strip: RawStrip) -> Self {
        self.strips.insert(chapter.clone(), strip);
        self
    }

    /// The next fetches of `chapter` fail with `kinds`, in order.
    pub fn failing(self, chapter: &ChapterRef, kinds: impl IntoIterator<Item = SourceErrorKind>) -> Self {
        self.failures.lock().unwrap().insert(chapter.clone(), kinds.into_iter().collect());
        self
    }

    /// Fetches of `chapter` block until [`open_gate`](Self::open_gate).
    pub fn gated(self, chapter: &ChapterRef) -> Self {
        self.gated.lock().unwrap().insert(chapter.clone());
        self
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(1);
    }

    pub fn fetches(&self, chapter: &ChapterRef) -> usize {
        self.fetches.lock().unwrap().get(chapter).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ChapterSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_strip(&self, chapter: &ChapterRef) -> SourceResult<RawStrip> {
        *self.fetches.lock().unwrap().entry(chapter.clone()).or_default() += 1;
        if self.gated.lock().unwrap().contains(chapter) {
            let _open = self.gate.acquire().await.unwrap();
        }
        let failure = self.failures.lock().unwrap().get_mut(chapter).and_then(VecDeque::pop_front);
        if let Some(kind) = failure {
            exn::bail!(kind);
        }
        match self.strips.get(chapter) {
            Some(strip) => Ok(strip.clone()),
            None => exn::bail!(SourceErrorKind::NotFound),
        }
    }

    async fn chapters(&self, manga: &MangaId) -> SourceResult<Vec<ChapterNumber>> {
        match self.listed.get(manga) {
            Some(numbers) => Ok(numbers.clone()),
            None => exn::bail!(SourceErrorKind::NotFound),
        }
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub cache: Arc<ChapterCache>,
    pub backend: Arc<MockBackend>,
    pub pipeline: ChapterProcessingPipeline,
}

pub fn harness(source: FakeSource, workers: usize) -> Harness {
    harness_on(Arc::new(source), Arc::new(MockBackend::default()), workers)
}

/// A pipeline over an existing cache backend, as a fresh process would see it.
pub fn harness_on(source: Arc<FakeSource>, backend: Arc<MockBackend>, workers: usize) -> Harness {
    let cache = Arc::new(ChapterCache::new(backend.clone()));
    let pipeline = ChapterProcessingPipeline::new(source.clone(), cache.clone(), options(workers)).unwrap();
    Harness { source, cache, backend, pipeline }
}

/// Poll until the chapter's state satisfies `predicate`.
pub async fn wait_for_state(
    pipeline: &ChapterProcessingPipeline,
    chapter: &ChapterRef,
    predicate: impl Fn(&ChapterState) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !predicate(&pipeline.state(chapter)) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{chapter} stuck in {}", pipeline.state(chapter)));
}

pub async fn settled(pipeline: &ChapterProcessingPipeline) {
    tokio::time::timeout(Duration::from_secs(5), pipeline.settled())
        .await
        .expect("pipeline did not settle");
}

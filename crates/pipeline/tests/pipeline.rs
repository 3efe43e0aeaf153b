mod common;

use common::{FakeSource, chapter, harness, harness_on, settled, wait_for_state};
use folio_pipeline::error::ErrorKind;
use folio_pipeline::source::error::ErrorKind as SourceErrorKind;
use folio_pipeline::{ChapterState, FailureKind, PipelineEvent, Priority, Requested};
use folio_segment::RawStrip;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn concurrent_requests_share_one_run() {
    let ch = chapter("solo", 1);
    let h = harness(FakeSource::new("solo", [1]).gated(&ch), 2);

    let requests = join_all((0..8).map(|_| h.pipeline.request(&ch, Priority::Foreground))).await;
    let pending: Vec<_> = requests.into_iter().map(|r| r.unwrap()).collect();
    assert!(pending.iter().all(|r| !r.is_ready()));
    assert!(h.pipeline.is_in_flight(&ch));

    h.source.open_gate();
    let pages: Vec<_> = join_all(pending.into_iter().map(Requested::wait)).await;
    let pages: Vec<_> = pages.into_iter().map(|p| p.unwrap()).collect();
    assert!(pages.iter().all(|p| Arc::ptr_eq(p, &pages[0])));
    assert_eq!(h.source.fetches(&ch), 1);
    assert_eq!(h.pipeline.state(&ch), ChapterState::Cached);
    assert!(h.cache.has(&ch).await.unwrap());
}

#[tokio::test]
async fn pages_cover_the_strip() {
    let ch = chapter("solo", 1);
    let h = harness(FakeSource::new("solo", [1]), 1);
    let pages = h.pipeline.open_chapter(&ch).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.height).sum::<u32>(), common::STRIP_HEIGHT);
    assert!(pages.iter().all(|p| (40..=80).contains(&p.height)));
    assert!(pages.iter().enumerate().all(|(i, p)| p.index == i));

    // Reading back gives the same bytes.
    let cached = h.cache.get(&ch).await.unwrap().unwrap();
    assert_eq!(cached.as_slice(), &*pages);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let ch = chapter("flaky", 1);
    let source = FakeSource::new("flaky", [1]).failing(&ch, [SourceErrorKind::Network, SourceErrorKind::Network]);
    let h = harness(source, 1);
    h.pipeline.open_chapter(&ch).await.unwrap();
    assert_eq!(h.source.fetches(&ch), 3);
    assert_eq!(h.pipeline.state(&ch), ChapterState::Cached);
}

#[tokio::test]
async fn exhausted_retries_can_be_retried_explicitly() {
    let ch = chapter("flaky", 1);
    let source = FakeSource::new("flaky", [1]).failing(&ch, [SourceErrorKind::Network; 3]);
    let h = harness(source, 1);

    let err = h.pipeline.open_chapter(&ch).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::Network));
    assert!(h.pipeline.state(&ch).is_failed());

    // Background work leaves a failed chapter alone.
    assert!(h.pipeline.request(&ch, Priority::Background).await.is_err());
    assert_eq!(h.source.fetches(&ch), 3);

    h.pipeline.retry(&ch).await.unwrap().wait().await.unwrap();
    assert_eq!(h.source.fetches(&ch), 4);
    assert_eq!(h.pipeline.state(&ch), ChapterState::Cached);
}

#[tokio::test]
async fn missing_chapter_fails_for_good() {
    let ch = chapter("gone", 13);
    let h = harness(FakeSource::new("gone", [13]).missing(&ch), 1);

    let err = h.pipeline.open_chapter(&ch).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(matches!(h.pipeline.state(&ch), ChapterState::Failed(ref f) if f.kind == FailureKind::NotFound));

    for priority in [Priority::Foreground, Priority::Background] {
        let err = h.pipeline.request(&ch, priority).await.unwrap_err();
        assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::NotFound));
    }
    assert!(h.pipeline.retry(&ch).await.is_err());
    assert_eq!(h.source.fetches(&ch), 1);

    h.pipeline.invalidate(&ch).await.unwrap();
    assert_eq!(h.pipeline.state(&ch), ChapterState::Unprocessed);
}

#[tokio::test]
async fn undecodable_strip_is_a_segmentation_failure() {
    let ch = chapter("broken", 1);
    let source = FakeSource::new("broken", [1]).with_strip(&ch, RawStrip::single(b"not an image".to_vec()));
    let h = harness(source, 1);
    let err = h.pipeline.open_chapter(&ch).await.unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::Segmentation));
    assert!(err.is_retryable());
    assert!(!h.cache.has(&ch).await.unwrap());
}

#[tokio::test]
async fn cache_write_failure_is_fatal() {
    let ch = chapter("full", 1);
    let h = harness(FakeSource::new("full", [1]), 1);
    h.backend.set_full(true);

    let err = h.pipeline.open_chapter(&ch).await.unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::CacheIo));
    assert!(!err.is_retryable());
    assert!(h.backend.paths().await.is_empty());

    // Freeing space doesn't bring the chapter back by itself.
    h.backend.set_full(false);
    assert!(h.pipeline.request(&ch, Priority::Foreground).await.is_err());
    h.pipeline.invalidate(&ch).await.unwrap();
    h.pipeline.open_chapter(&ch).await.unwrap();
    assert_eq!(h.source.fetches(&ch), 2);
}

#[tokio::test]
async fn cancelled_run_leaves_nothing_behind() {
    let ch = chapter("slow", 1);
    let h = harness(FakeSource::new("slow", [1]).gated(&ch), 1);

    let Requested::Pending(pending) = h.pipeline.request(&ch, Priority::Background).await.unwrap() else {
        panic!("nothing should be cached yet");
    };
    wait_for_state(&h.pipeline, &ch, |state| *state == ChapterState::Fetching).await;
    assert!(h.pipeline.cancel(&ch));

    let err = pending.wait().await.unwrap_err();
    assert_eq!(*err, ErrorKind::Cancelled);
    settled(&h.pipeline).await;
    assert_eq!(h.pipeline.state(&ch), ChapterState::Unprocessed);
    assert!(!h.cache.has(&ch).await.unwrap());
    assert!(h.backend.paths().await.is_empty());

    // Nothing stops the chapter from being processed later.
    h.source.open_gate();
    h.pipeline.open_chapter(&ch).await.unwrap();
    assert_eq!(h.pipeline.state(&ch), ChapterState::Cached);
}

#[tokio::test]
async fn foreground_waiters_block_cancellation() {
    let ch = chapter("slow", 1);
    let h = harness(FakeSource::new("slow", [1]).gated(&ch), 1);

    let background = h.pipeline.request(&ch, Priority::Background).await.unwrap();
    let foreground = h.pipeline.request(&ch, Priority::Foreground).await.unwrap();
    assert!(!h.pipeline.cancel(&ch));

    h.source.open_gate();
    let (a, b) = (background.wait().await.unwrap(), foreground.wait().await.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.source.fetches(&ch), 1);
}

#[tokio::test]
async fn promotion_overtakes_busy_workers() {
    let busy = chapter("queue", 1);
    let wanted = chapter("queue", 2);
    let h = harness(FakeSource::new("queue", [1, 2]).gated(&busy), 1);

    let _busy = h.pipeline.request(&busy, Priority::Background).await.unwrap();
    wait_for_state(&h.pipeline, &busy, |state| *state == ChapterState::Fetching).await;
    let queued = h.pipeline.request(&wanted, Priority::Background).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.pipeline.state(&wanted), ChapterState::Unprocessed);

    // The reader opens the queued chapter; the same run moves to the
    // foreground slot while the only background worker stays busy.
    let opened = tokio::time::timeout(Duration::from_secs(5), h.pipeline.open_chapter(&wanted))
        .await
        .expect("promoted run should not wait for the busy worker")
        .unwrap();
    let queued = queued.wait().await.unwrap();
    assert!(Arc::ptr_eq(&opened, &queued));
    assert_eq!(h.source.fetches(&wanted), 1);
    assert_eq!(h.pipeline.state(&busy), ChapterState::Fetching);

    h.source.open_gate();
    settled(&h.pipeline).await;
}

#[tokio::test]
async fn fresh_pipeline_reads_the_cache() {
    let ch = chapter("kept", 1);
    let first = harness(FakeSource::new("kept", [1]), 1);
    let written = first.pipeline.open_chapter(&ch).await.unwrap();

    let second = harness_on(Arc::new(FakeSource::new("kept", [1])), first.backend.clone(), 1);
    assert_eq!(second.pipeline.state(&ch), ChapterState::Unprocessed);
    let Requested::Ready(pages) = second.pipeline.request(&ch, Priority::Background).await.unwrap() else {
        panic!("expected a cache hit");
    };
    assert_eq!(&*pages, &*written);
    assert_eq!(second.source.total_fetches(), 0);
    assert_eq!(second.pipeline.state(&ch), ChapterState::Cached);
}

#[tokio::test]
async fn invalidate_forces_reprocessing() {
    let ch = chapter("again", 1);
    let h = harness(FakeSource::new("again", [1]), 1);
    h.pipeline.open_chapter(&ch).await.unwrap();
    h.pipeline.invalidate(&ch).await.unwrap();
    assert_eq!(h.pipeline.state(&ch), ChapterState::Unprocessed);
    assert!(!h.cache.has(&ch).await.unwrap());

    h.pipeline.open_chapter(&ch).await.unwrap();
    assert_eq!(h.source.fetches(&ch), 2);
}

#[tokio::test]
async fn state_changes_are_published() {
    let ch = chapter("watched", 1);
    let h = harness(FakeSource::new("watched", [1]), 1);
    let mut events = h.pipeline.subscribe();
    h.pipeline.open_chapter(&ch).await.unwrap();
    settled(&h.pipeline).await;

    let mut seen = Vec::new();
    while let Ok(PipelineEvent::StateChanged { chapter, state }) = events.try_recv() {
        assert_eq!(chapter, ch);
        seen.push(state);
    }
    assert_eq!(seen, vec![ChapterState::Fetching, ChapterState::Segmenting, ChapterState::Cached]);
}

#[tokio::test]
async fn prefetch_checks_the_cache_without_reading_it() {
    let ch = chapter("warm", 1);
    let h = harness(FakeSource::new("warm", [1]), 1);

    let pending = h.pipeline.prefetch(&ch).await.unwrap().expect("nothing cached yet");
    pending.wait().await.unwrap();
    assert_eq!(h.source.fetches(&ch), 1);

    let fresh = harness_on(Arc::new(FakeSource::new("warm", [1])), h.backend.clone(), 1);
    let reads = fresh.backend.reads();
    assert!(fresh.pipeline.prefetch(&ch).await.unwrap().is_none());
    assert_eq!(fresh.backend.reads(), reads);
    assert_eq!(fresh.pipeline.state(&ch), ChapterState::Cached);
    assert_eq!(fresh.source.total_fetches(), 0);
}

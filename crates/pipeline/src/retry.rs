//! Fetching with bounded retries.

use crate::source::ChapterSource;
use crate::source::error::ErrorKind as SourceErrorKind;
use crate::state::{Failure, FailureKind};
use folio_cache::ChapterRef;
use folio_config::FetchSection;
use folio_segment::RawStrip;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How hard to try before giving up on a strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchSection::default())
    }
}
impl From<&FetchSection> for RetryPolicy {
    fn from(fetch: &FetchSection) -> Self {
        Self {
            max_attempts: fetch.retry_max,
            base_delay: fetch.backoff_base(),
            max_delay: fetch.backoff_max(),
            timeout: fetch.timeout(),
        }
    }
}
impl RetryPolicy {
    /// Wait before retry number `retry` (the first retry is `1`):
    /// `base * 2^(retry - 1)`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
    }
}

/// Why [`fetch`] stopped without a strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchError {
    Cancelled,
    Failed(Failure),
}

/// Fetch a strip, retrying transient failures with exponential backoff.
///
/// `NotFound` ends the loop immediately. Cancellation is checked before
/// every attempt and interrupts both the attempt and the backoff sleep.
pub(crate) async fn fetch(
    source: &dyn ChapterSource,
    chapter: &ChapterRef,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RawStrip, FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut last = Failure::new(FailureKind::Network, "no attempt made");
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(policy.timeout, source.fetch_strip(chapter)) => outcome,
        };
        last = match outcome {
            Ok(Ok(strip)) => return Ok(strip),
            Ok(Err(err)) if *err == SourceErrorKind::NotFound => {
                return Err(FetchError::Failed(Failure::new(FailureKind::NotFound, format!("{err:?}"))));
            },
            Ok(Err(err)) => Failure::new(FailureKind::Network, format!("{err:?}")),
            Err(_elapsed) => Failure::new(FailureKind::Network, format!("attempt timed out after {:?}", policy.timeout)),
        };
        if attempt == attempts {
            break;
        }
        let delay = policy.delay_for_retry(attempt);
        tracing::warn!(attempt, ?delay, failure = %last, "fetch failed, retrying");
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            () = tokio::time::sleep(delay) => {},
        }
    }
    Err(FetchError::Failed(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::error::Result as SourceResult;
    use async_trait::async_trait;
    use folio_cache::{ChapterNumber, MangaId};
    use rstest::rstest;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a script of outcomes, then succeeds forever.
    struct Scripted {
        script: Mutex<Vec<Option<SourceErrorKind>>>,
        calls: AtomicU32,
    }
    impl Scripted {
        fn new(script: Vec<Option<SourceErrorKind>>) -> Self {
            Self { script: Mutex::new(script), calls: AtomicU32::new(0) }
        }
    }
    #[async_trait]
    impl ChapterSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn fetch_strip(&self, _chapter: &ChapterRef) -> SourceResult<RawStrip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() { None } else { script.remove(0) }
            };
            match next {
                Some(kind) => exn::bail!(kind),
                None => Ok(RawStrip::single(b"strip".to_vec())),
            }
        }
        async fn chapters(&self, _manga: &MangaId) -> SourceResult<Vec<ChapterNumber>> {
            Ok(vec![])
        }
    }

    fn chapter() -> ChapterRef {
        ChapterRef::new(MangaId::new("m").unwrap(), 1)
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(60),
        }
    }

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_millis(500))]
    #[case(2, Duration::from_secs(1))]
    #[case(3, Duration::from_secs(2))]
    #[case(5, Duration::from_secs(8))]
    #[case(40, Duration::from_secs(8))]
    fn backoff(#[case] retry: u32, #[case] expected: Duration) {
        assert_eq!(policy(3).delay_for_retry(retry), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let source = Scripted::new(vec![Some(SourceErrorKind::Network), Some(SourceErrorKind::Network)]);
        let strip = fetch(&source, &chapter(), &policy(3), &CancellationToken::new()).await.unwrap();
        assert_eq!(strip.parts().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = Scripted::new(vec![Some(SourceErrorKind::Network); 5]);
        let err = fetch(&source, &chapter(), &policy(3), &CancellationToken::new()).await.unwrap_err();
        let FetchError::Failed(failure) = err else { panic!("expected a failure") };
        assert_eq!(failure.kind, FailureKind::Network);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let source = Scripted::new(vec![Some(SourceErrorKind::NotFound)]);
        let err = fetch(&source, &chapter(), &policy(3), &CancellationToken::new()).await.unwrap_err();
        let FetchError::Failed(failure) = err else { panic!("expected a failure") };
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_attempt() {
        let source = Scripted::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(fetch(&source, &chapter(), &policy(3), &cancel).await.unwrap_err(), FetchError::Cancelled);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let source = Scripted::new(vec![Some(SourceErrorKind::Network); 5]);
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };
        assert_eq!(fetch(&source, &chapter(), &policy(3), &cancel).await.unwrap_err(), FetchError::Cancelled);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        canceller.await.unwrap();
    }

    struct Hangs;
    #[async_trait]
    impl ChapterSource for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }
        async fn fetch_strip(&self, _chapter: &ChapterRef) -> SourceResult<RawStrip> {
            std::future::pending().await
        }
        async fn chapters(&self, _manga: &MangaId) -> SourceResult<Vec<ChapterNumber>> {
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_time_out() {
        let policy = RetryPolicy { timeout: Duration::from_secs(1), ..policy(2) };
        let err = fetch(&Hangs, &chapter(), &policy, &CancellationToken::new()).await.unwrap_err();
        let FetchError::Failed(failure) = err else { panic!("expected a failure") };
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("timed out"));
    }
}

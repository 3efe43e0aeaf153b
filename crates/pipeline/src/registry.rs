//! The single source of truth for chapter states and in-flight runs.
//!
//! Every decision that must not race (join an existing run or start a new
//! one, promote, cancel, record a transition) happens under one lock, and the
//! lock is never held across an `.await`.

use crate::error::{ErrorKind, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::state::{ChapterState, Failure, Priority};
use folio_cache::ChapterRef;
use folio_segment::Page;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The pages of one chapter, shared by everyone who asked for it.
pub type Pages = Arc<[Page]>;

/// How a run ended.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Ready(Pages),
    Failed(Failure),
    Cancelled,
}

/// A chapter that is being processed; [`wait`](Self::wait) for its pages.
#[derive(Debug)]
pub struct PendingChapter {
    chapter: ChapterRef,
    outcome: watch::Receiver<Option<Outcome>>,
}
impl PendingChapter {
    pub fn chapter(&self) -> &ChapterRef {
        &self.chapter
    }

    /// Wait for the run to finish.
    ///
    /// Every waiter on the same run receives the same pages (the same
    /// allocation, not a copy) or the same failure.
    pub async fn wait(mut self) -> Result<Pages> {
        let outcome = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            // The run went away without reporting anything.
            Err(_) => None,
        };
        match outcome {
            Some(Outcome::Ready(pages)) => Ok(pages),
            Some(Outcome::Failed(failure)) => exn::bail!(ErrorKind::Failed(failure)),
            Some(Outcome::Cancelled) | None => exn::bail!(ErrorKind::Cancelled),
        }
    }
}

/// One attempt at processing one chapter.
pub(crate) struct Run {
    pub(crate) id: u64,
    pub(crate) chapter: ChapterRef,
    pub(crate) cancel: CancellationToken,
    priority: watch::Sender<Priority>,
    outcome: watch::Sender<Option<Outcome>>,
}
impl Run {
    pub(crate) fn priority(&self) -> Priority {
        *self.priority.borrow()
    }

    pub(crate) fn watch_priority(&self) -> watch::Receiver<Priority> {
        self.priority.subscribe()
    }

    fn pending(&self) -> PendingChapter {
        PendingChapter {
            chapter: self.chapter.clone(),
            outcome: self.outcome.subscribe(),
        }
    }

    /// A cancelled run may still be winding down; nobody new may join it.
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn promote(&self, priority: Priority) {
        self.priority.send_if_modified(|current| {
            let raise = priority > *current;
            if raise {
                *current = priority;
            }
            raise
        });
    }

    fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

#[derive(Default)]
struct Entry {
    state: ChapterState,
    run: Option<Arc<Run>>,
}
impl Entry {
    fn live_run(&self) -> Option<&Arc<Run>> {
        self.run.as_ref().filter(|run| run.is_live())
    }

    /// Whether a request at `priority` may start processing this chapter.
    /// Background work never touches failed chapters; foreground work only
    /// retries the retryable ones.
    fn refusal(&self, priority: Priority) -> Option<Failure> {
        match &self.state {
            ChapterState::Failed(failure) if !failure.is_retryable() || priority == Priority::Background => {
                Some(failure.clone())
            },
            _ => None,
        }
    }
}

/// Result of looking a chapter up before touching the cache.
pub(crate) enum Lookup {
    /// Someone is already on it.
    Joined(PendingChapter),
    /// The chapter's recorded failure stands.
    Refused(Failure),
    /// Nothing is running; check the cache, then [`claim`](InFlightRegistry::claim).
    /// `cached` is whether the chapter was last known to be cached.
    Idle { cached: bool },
}

pub(crate) enum Claim {
    Joined(PendingChapter),
    Refused(Failure),
    /// Another run cached the chapter after the caller looked it up.
    Cached,
    /// A new run was registered; the caller must execute it.
    Started(Arc<Run>, PendingChapter),
}

/// `ChapterRef → (state, run)` with at most one live run per chapter.
pub(crate) struct InFlightRegistry {
    entries: Mutex<HashMap<ChapterRef, Entry>>,
    next_id: AtomicU64,
    active: watch::Sender<usize>,
    events: EventBus,
}
impl InFlightRegistry {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            active: watch::Sender::new(0),
            events,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ChapterRef, Entry>> {
        // Entries are plain data; a panic elsewhere can't leave one half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, chapter: &ChapterRef, entry: &mut Entry, state: ChapterState) {
        if entry.state != state {
            entry.state = state.clone();
            self.events.publish(PipelineEvent::StateChanged { chapter: chapter.clone(), state });
        }
    }

    pub(crate) fn state(&self, chapter: &ChapterRef) -> ChapterState {
        self.entries().get(chapter).map(|entry| entry.state.clone()).unwrap_or_default()
    }

    /// `true` while a run that hasn't been cancelled exists for the chapter.
    pub(crate) fn is_in_flight(&self, chapter: &ChapterRef) -> bool {
        self.entries().get(chapter).is_some_and(|entry| entry.live_run().is_some())
    }

    pub(crate) fn lookup(&self, chapter: &ChapterRef, priority: Priority) -> Lookup {
        let entries = self.entries();
        let Some(entry) = entries.get(chapter) else {
            return Lookup::Idle { cached: false };
        };
        if let Some(run) = entry.live_run() {
            run.promote(priority);
            return Lookup::Joined(run.pending());
        }
        match entry.refusal(priority) {
            Some(failure) => Lookup::Refused(failure),
            None => Lookup::Idle { cached: entry.state.is_cached() },
        }
    }

    /// Join the chapter's live run, or register a new one.
    pub(crate) fn claim(&self, chapter: &ChapterRef, priority: Priority) -> Claim {
        let mut entries = self.entries();
        let entry = entries.entry(chapter.clone()).or_default();
        if let Some(run) = entry.live_run() {
            run.promote(priority);
            return Claim::Joined(run.pending());
        }
        if let Some(failure) = entry.refusal(priority) {
            return Claim::Refused(failure);
        }
        if entry.state.is_cached() {
            return Claim::Cached;
        }

        let run = Arc::new(Run {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            chapter: chapter.clone(),
            cancel: CancellationToken::new(),
            priority: watch::Sender::new(priority),
            outcome: watch::Sender::new(None),
        });
        let pending = run.pending();
        entry.run = Some(run.clone());
        if entry.state.is_failed() {
            self.set_state(chapter, entry, ChapterState::Unprocessed);
        }
        self.active.send_modify(|count| *count += 1);
        Claim::Started(run, pending)
    }

    /// Record a state change made by `run`. Ignored (returning `false`) if
    /// the chapter has moved on to another run in the meantime.
    pub(crate) fn transition(&self, run: &Run, state: ChapterState) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&run.chapter) else {
            return false;
        };
        if entry.run.as_ref().is_none_or(|current| current.id != run.id) {
            return false;
        }
        self.set_state(&run.chapter, entry, state);
        true
    }

    /// Record how `run` ended, detach it and wake its waiters.
    pub(crate) fn finish(&self, run: &Run, outcome: Outcome) {
        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(&run.chapter)
                && entry.run.as_ref().is_some_and(|current| current.id == run.id)
            {
                let state = match &outcome {
                    Outcome::Ready(_) => ChapterState::Cached,
                    Outcome::Failed(failure) => ChapterState::Failed(failure.clone()),
                    Outcome::Cancelled => ChapterState::Unprocessed,
                };
                entry.run = None;
                self.set_state(&run.chapter, entry, state);
            }
        }
        run.outcome.send_replace(Some(outcome));
    }

    /// Cancel the chapter's run if nobody in the foreground is waiting on
    /// it. Returns whether a run was cancelled.
    pub(crate) fn cancel(&self, chapter: &ChapterRef) -> bool {
        let entries = self.entries();
        match entries.get(chapter).and_then(Entry::live_run) {
            Some(run) if run.priority() == Priority::Background => {
                run.cancel.cancel();
                true
            },
            _ => false,
        }
    }

    /// The cache has the chapter; say so unless a run is about to decide
    /// otherwise.
    pub(crate) fn mark_cached(&self, chapter: &ChapterRef) {
        let mut entries = self.entries();
        let entry = entries.entry(chapter.clone()).or_default();
        if entry.live_run().is_none() {
            self.set_state(chapter, entry, ChapterState::Cached);
        }
    }

    /// Forget everything known about an idle chapter.
    pub(crate) fn reset(&self, chapter: &ChapterRef) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(chapter)
            && entry.live_run().is_none()
        {
            self.set_state(chapter, entry, ChapterState::Unprocessed);
        }
    }

    /// Clear a retryable failure so the chapter can be requested again.
    pub(crate) fn clear_failure(&self, chapter: &ChapterRef) -> std::result::Result<(), Failure> {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(chapter) else {
            return Ok(());
        };
        match &entry.state {
            ChapterState::Failed(failure) if !failure.is_retryable() => Err(failure.clone()),
            ChapterState::Failed(_) => {
                self.set_state(chapter, entry, ChapterState::Unprocessed);
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Called exactly once per started run, after it is done with the cache.
    pub(crate) fn release(&self, run: &Run) {
        if !run.is_finished() {
            self.finish(run, Outcome::Cancelled);
        }
        self.active.send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Resolves once no run is executing.
    pub(crate) async fn settled(&self) {
        let mut active = self.active.subscribe();
        // The sender lives as long as `self`, so this can't fail.
        let _ = active.wait_for(|count| *count == 0).await;
    }
}

//! One-way notifications from the pipeline to whoever is presenting it.

use crate::state::ChapterState;
use folio_cache::ChapterRef;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Something observable happened to a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The chapter moved to a new state.
    StateChanged { chapter: ChapterRef, state: ChapterState },
}

/// Broadcast channel for [`PipelineEvent`]s.
///
/// Publishing never blocks. Subscribers that fall behind get
/// [`RecvError::Lagged`](broadcast::error::RecvError::Lagged) and can
/// re-read whatever state they need from the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}
impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}
impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

//! Execution slots for runs.
//!
//! Background runs share `workers` permits, handed out in FIFO order.
//! Foreground runs draw from a separate reserved slot so they never queue
//! behind prefetching, and a background run that gets promoted while it is
//! still queued moves over to the reserved slot.

use crate::state::Priority;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

/// Foreground work is one chapter at a time: the one being read.
pub const FOREGROUND_SLOTS: usize = 1;

pub(crate) struct WorkerPool {
    background: Arc<Semaphore>,
    foreground: Arc<Semaphore>,
}
impl WorkerPool {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            background: Arc::new(Semaphore::new(workers)),
            foreground: Arc::new(Semaphore::new(FOREGROUND_SLOTS)),
        }
    }

    /// Wait for a slot matching the run's (possibly changing) priority.
    ///
    /// Returns `None` only if the pool has been closed.
    pub(crate) async fn acquire(&self, mut priority: watch::Receiver<Priority>) -> Option<OwnedSemaphorePermit> {
        if *priority.borrow_and_update() == Priority::Foreground {
            return self.foreground.clone().acquire_owned().await.ok();
        }
        let promoted = tokio::select! {
            permit = self.background.clone().acquire_owned() => return permit.ok(),
            promoted = async { priority.wait_for(|p| *p == Priority::Foreground).await.is_ok() } => promoted,
        };
        let slots = if promoted { &self.foreground } else { &self.background };
        slots.clone().acquire_owned().await.ok()
    }

    #[cfg(test)]
    fn available_background(&self) -> usize {
        self.background.available_permits()
    }
}

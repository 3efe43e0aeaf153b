//! Turning chapters into cached pages, once each, in the right order.
//!
//! [`ChapterProcessingPipeline`] runs fetch → segment → cache for a chapter.
//! However many callers ask for the same chapter at once, one run does the
//! work and every caller receives the same [`Pages`]. Runs carry a
//! [`Priority`]: foreground runs (the chapter being read) have a reserved
//! execution slot, background runs share a bounded pool, and a background run
//! that a reader starts waiting on is promoted in place.
//!
//! [`PrefetchScheduler`] sits on top and keeps the chapters after the current
//! one processed, cancelling background runs that fall out of its window.
//!
//! Chapter state changes are published as [`PipelineEvent`]s.

pub mod error;
mod events;
mod pipeline;
mod pool;
mod registry;
mod retry;
mod scheduler;
pub mod source;
mod state;

pub use crate::events::{EventBus, PipelineEvent};
pub use crate::pipeline::{ChapterProcessingPipeline, PipelineOptions, Requested};
pub use crate::pool::FOREGROUND_SLOTS;
pub use crate::registry::{Pages, PendingChapter};
pub use crate::retry::RetryPolicy;
pub use crate::scheduler::PrefetchScheduler;
pub use crate::source::{ChapterList, ChapterSource, SourceHandle, StorageSource};
pub use crate::state::{ChapterState, Failure, FailureKind, Priority};

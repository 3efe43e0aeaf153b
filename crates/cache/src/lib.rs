//! Durable page cache for segmented chapters.
//!
//! Segmenting a chapter is expensive, so its pages are written to storage
//! once and read back from then on. The cache is the source of truth for
//! "has this chapter been processed": a chapter is cached exactly when its
//! container exists, and a container is only ever visible complete.
//!
//! # Layout
//! ```text
//! <root>/<manga>/<chapter>/page_0000.png
//!                         /page_0001.png
//! <root>/.staging/…   (in-progress writes)
//! <root>/.trash/…     (replaced entries awaiting deletion)
//! ```
//! The container path is derived from the manga identifier and chapter
//! number alone, so a fresh process finds everything a previous one wrote.

mod cache;
pub mod error;
mod models;

pub use crate::cache::ChapterCache;
pub use crate::models::{ChapterNumber, ChapterRef, MangaId};
pub use folio_segment::Page;

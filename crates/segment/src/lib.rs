//! Page segmentation for vertically scrolling strips.
//!
//! A strip is cut into pages in four passes: decode and stitch the parts,
//! score every row for blankness, find runs of blank rows, then greedily plan
//! boundaries within the configured page height range. Each page is finally
//! cropped out and PNG-encoded. The whole thing is pure and deterministic: the
//! same strip and config always produce the same pages, byte for byte.

mod config;
pub mod error;
mod page;
mod plan;
mod score;
mod strip;

use tracing::instrument;

pub use crate::config::SegmentConfig;
use crate::error::{ErrorKind, Result};
pub use crate::page::Page;
pub use crate::score::{Band, ROW_CHECKPOINT_INTERVAL};
pub use crate::strip::RawStrip;

/// Split a strip into pages.
///
/// See [`segment_with`] for a cancellable version.
pub fn segment(strip: &RawStrip, config: &SegmentConfig) -> Result<Vec<Page>> {
    segment_with(strip, config, || false)
}

/// Split a strip into pages, polling `cancelled` between passes and every
/// [`ROW_CHECKPOINT_INTERVAL`] rows while scoring.
///
/// Returns [`ErrorKind::Cancelled`] as soon as `cancelled` reports `true`.
#[instrument(skip_all, fields(parts = strip.parts().len(), height, pages))]
pub fn segment_with(strip: &RawStrip, config: &SegmentConfig, cancelled: impl Fn() -> bool) -> Result<Vec<Page>> {
    config.validate()?;
    let canvas = strip::decode(strip, &cancelled)?;
    let height = canvas.height();
    tracing::Span::current().record("height", height);
    if height < config.min_page_height {
        exn::bail!(ErrorKind::TooSmall { height, min: config.min_page_height });
    }

    checkpoint(&cancelled)?;
    let scores = score::row_scores(&canvas, &cancelled)?;
    checkpoint(&cancelled)?;
    let bands = score::find_blank_bands(&scores, config.blank_threshold, config.min_blank_rows);
    tracing::debug!(bands = bands.len(), "found blank bands");

    checkpoint(&cancelled)?;
    let boundaries = plan::plan_boundaries(height, &bands, config);

    let mut pages = Vec::with_capacity(boundaries.len().saturating_sub(1));
    for (index, pair) in boundaries.windows(2).enumerate() {
        checkpoint(&cancelled)?;
        pages.push(page::encode(&canvas, index, pair[0], pair[1])?);
    }
    tracing::Span::current().record("pages", pages.len());
    Ok(pages)
}

fn checkpoint(cancelled: &impl Fn() -> bool) -> Result<()> {
    if cancelled() {
        exn::bail!(ErrorKind::Cancelled);
    }
    Ok(())
}

//! Greedy boundary planning.

use crate::config::SegmentConfig;
use crate::score::Band;

/// Choose page boundaries for a strip of `height` rows.
///
/// The result starts at `0`, ends at `height` and is strictly increasing.
/// Every page is at most `max_page_height` tall; only the last one may be
/// shorter than `min_page_height`. From each boundary the planner picks the
/// band midpoint inside `[last + min, last + max]` closest to the ideal page
/// height, preferring the earlier row on a tie, and forces a cut at
/// `last + max` when no band qualifies.
pub(crate) fn plan_boundaries(height: u32, bands: &[Band], config: &SegmentConfig) -> Vec<u32> {
    let min = config.min_page_height;
    let max = config.max_page_height;
    let ideal = config.ideal_page_height();
    let candidates: Vec<u32> = bands.iter().map(Band::midpoint).collect();

    let mut boundaries = vec![0];
    let mut last = 0u32;
    while height - last > max {
        let lo = last + min;
        let hi = last + max;
        let target = last + ideal;
        let chosen = candidates
            .iter()
            .copied()
            .filter(|&c| c >= lo && c <= hi)
            // `min_by_key` keeps the first of equal keys, i.e. the earlier row.
            .min_by_key(|&c| c.abs_diff(target));
        let next = chosen.unwrap_or(hi);
        tracing::trace!(from = last, to = next, forced = chosen.is_none(), "page boundary");
        boundaries.push(next);
        last = next;
    }
    boundaries.push(height);
    boundaries
}

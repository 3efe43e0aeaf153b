//! Row blankness scoring and blank band detection.

use crate::error::{ErrorKind, Result};
use image::{GrayImage, RgbImage, imageops};

/// How many rows are scored between two cancellation checks.
pub const ROW_CHECKPOINT_INTERVAL: usize = 256;

/// A maximal run of blank rows, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u32,
    pub end: u32,
}
impl Band {
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Where a page boundary would go if this band were chosen.
    pub fn midpoint(&self) -> u32 {
        self.start + (self.end - self.start) / 2
    }
}

/// Score every row of the canvas by the population standard deviation of
/// its luminance. A perfectly uniform row scores `0.0`.
pub(crate) fn row_scores(canvas: &RgbImage, checkpoint: &impl Fn() -> bool) -> Result<Vec<f64>> {
    let luma: GrayImage = imageops::grayscale(canvas);
    let width = luma.width() as usize;
    let mut scores = Vec::with_capacity(luma.height() as usize);
    if width == 0 {
        return Ok(scores);
    }
    for (y, row) in luma.as_raw().chunks_exact(width).enumerate() {
        if y % ROW_CHECKPOINT_INTERVAL == 0 && checkpoint() {
            exn::bail!(ErrorKind::Cancelled);
        }
        scores.push(std_dev(row));
    }
    Ok(scores)
}

fn std_dev(row: &[u8]) -> f64 {
    let n = row.len() as f64;
    let mean = row.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = row
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Collect the maximal runs of rows scoring below `threshold` that are at
/// least `min_rows` long, top to bottom.
pub(crate) fn find_blank_bands(scores: &[f64], threshold: f64, min_rows: u32) -> Vec<Band> {
    let mut bands = Vec::new();
    let mut run_start: Option<usize> = None;
    // A trailing sentinel closes a run that reaches the last row.
    for (y, blank) in scores.iter().map(|&s| s < threshold).chain(std::iter::once(false)).enumerate() {
        match (blank, run_start) {
            (true, None) => run_start = Some(y),
            (false, Some(start)) => {
                let band = Band { start: start as u32, end: (y - 1) as u32 };
                if band.len() >= min_rows {
                    bands.push(band);
                }
                run_start = None;
            },
            _ => {},
        }
    }
    bands
}

//! Raw strips and how they become one canvas.
//!
//! Sources rarely serve a chapter as a single image: most split the strip
//! into a handful of tall parts. A [`RawStrip`] keeps those encoded parts in
//! reading order; [`decode`] stacks them into the single canvas the
//! segmenter works on.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::{RgbImage, imageops};

/// The encoded image parts of one chapter, top to bottom.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawStrip {
    parts: Vec<Vec<u8>>,
}
impl RawStrip {
    /// A strip delivered as one single image.
    pub fn single(bytes: impl Into<Vec<u8>>) -> Self {
        Self { parts: vec![bytes.into()] }
    }

    pub fn from_parts(parts: impl IntoIterator<Item = impl Into<Vec<u8>>>) -> Self {
        Self { parts: parts.into_iter().map(Into::into).collect() }
    }

    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() || self.parts.iter().all(Vec::is_empty)
    }

    /// Total encoded size of every part.
    pub fn encoded_len(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }
}
impl std::fmt::Debug for RawStrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawStrip")
            .field("parts", &self.parts.len())
            .field("bytes", &self.encoded_len())
            .finish()
    }
}

/// Decode every part and stack them into one RGB canvas.
///
/// The canvas takes the first part's width. Narrower parts are left-aligned
/// on black, wider parts are cropped on the right.
pub(crate) fn decode(strip: &RawStrip, checkpoint: &impl Fn() -> bool) -> Result<RgbImage> {
    if strip.is_empty() {
        exn::bail!(ErrorKind::EmptyInput);
    }
    let mut decoded = Vec::with_capacity(strip.parts.len());
    for (index, bytes) in strip.parts.iter().enumerate() {
        if checkpoint() {
            exn::bail!(ErrorKind::Cancelled);
        }
        if bytes.is_empty() {
            exn::bail!(ErrorKind::EmptyInput);
        }
        let part = image::load_from_memory(bytes).or_raise(|| ErrorKind::Decode(index))?;
        decoded.push(part.to_rgb8());
    }

    let width = decoded[0].width();
    if width == 0 {
        exn::bail!(ErrorKind::Decode(0));
    }
    let height = decoded.iter().try_fold(0u32, |total, part| total.checked_add(part.height()));
    let Some(height) = height else {
        exn::bail!(ErrorKind::Decode(decoded.len() - 1));
    };

    if decoded.len() == 1 {
        return Ok(decoded.swap_remove(0));
    }
    let mut canvas = RgbImage::new(width, height);
    let mut y = 0i64;
    for part in &decoded {
        imageops::replace(&mut canvas, part, 0, y);
        y += i64::from(part.height());
    }
    Ok(canvas)
}

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::{ExtendedColorType, ImageEncoder, RgbImage, codecs::png::PngEncoder, imageops};

/// One page-sized slice of a strip, PNG-encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position in the chapter.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// PNG bytes.
    pub bytes: Vec<u8>,
}
impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Crop rows `[top, bottom)` out of the canvas and encode them.
pub(crate) fn encode(canvas: &RgbImage, index: usize, top: u32, bottom: u32) -> Result<Page> {
    let width = canvas.width();
    let height = bottom - top;
    let slice = imageops::crop_imm(canvas, 0, top, width, height).to_image();
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(slice.as_raw(), width, height, ExtendedColorType::Rgb8)
        .or_raise(|| ErrorKind::Encode(index))?;
    Ok(Page { index, width, height, bytes })
}

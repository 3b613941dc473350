use image::{GrayImage, Rgba, RgbaImage};

use super::Inpainter;
use crate::error::{ErrorKind, LocalizeResult};

/// Paints masked pixels a flat colour, white by default (the bubble interior).
#[derive(Debug, Clone, Copy)]
pub struct FillInpainter {
    color: Rgba<u8>,
}

impl FillInpainter {
    pub fn new(color: Rgba<u8>) -> Self {
        Self { color }
    }
}

impl Default for FillInpainter {
    fn default() -> Self {
        Self::new(Rgba([255, 255, 255, 255]))
    }
}

impl Inpainter for FillInpainter {
    fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> LocalizeResult<RgbaImage> {
        if image.dimensions() != mask.dimensions() {
            return Err(ErrorKind::InpaintingUnavailable(format!(
                "mask is {:?}, image is {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }
        let mut out = image.clone();
        for (px, m) in out.pixels_mut().zip(mask.pixels()) {
            if m.0[0] > 0 {
                *px = self.color;
            }
        }
        Ok(out)
    }
}

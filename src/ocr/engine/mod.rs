mod geom;
mod parse;
mod preprocess;
mod tesseract;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use std::io::Write;

pub use tesseract::list_tesseract_languages;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl LineBox {
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OcrLine {
    pub text: String,
    pub bbox: LineBox,
    pub conf: f32,
}

const SPARSE_TEXT_PSM: u32 = 11;
const DUPLICATE_IOU: f32 = 0.5;

/// Runs tesseract over the preprocessed variants of `image` and returns line
/// boxes in source-image pixel coordinates.
pub(crate) fn extract_lines(
    image: &DynamicImage,
    ocr_languages: &str,
    upscale: bool,
) -> Result<Vec<OcrLine>> {
    let (width, height) = image.dimensions();
    let scale = preprocess::ocr_scale(width, upscale);
    let languages = tesseract::normalize_ocr_languages(ocr_languages)?;

    let mut lines: Vec<OcrLine> = Vec::new();
    for ocr_image in preprocess::preprocess_for_ocr_variants(image, scale) {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        ocr_image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = tesseract::run_tesseract_tsv(tmp.path(), &languages, SPARSE_TEXT_PSM)?;
        for parsed in parse::parse_tsv_lines(&tsv) {
            let bbox = geom::scale_box(&parsed.bbox, scale);
            let line = OcrLine { bbox, ..parsed };
            if lines
                .iter()
                .any(|existing| geom::iou(&existing.bbox, &line.bbox) > DUPLICATE_IOU)
            {
                continue;
            }
            lines.push(line);
        }
    }

    lines.retain(|line| line.bbox.x < width && line.bbox.y < height);
    for line in &mut lines {
        line.bbox.w = line.bbox.w.min(width - line.bbox.x);
        line.bbox.h = line.bbox.h.min(height - line.bbox.y);
    }
    Ok(lines)
}

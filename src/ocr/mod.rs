mod debug;
mod engine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorKind, LocalizeResult};
use crate::languages;

pub use debug::{OcrDebugConfig, write_debug_overlay};
pub use engine::list_tesseract_languages;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One detected glyph run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextBox {
    pub polygon: Vec<Point>,
    pub text: String,
    pub confidence: f32,
}

impl RawTextBox {
    /// Mean of the polygon's points; `None` for an empty polygon.
    pub fn centroid(&self) -> Option<Point> {
        if self.polygon.is_empty() {
            return None;
        }
        let n = self.polygon.len() as f32;
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

pub trait RegionDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage, source_lang: &str) -> LocalizeResult<Vec<RawTextBox>>;
}

/// Region detector backed by the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    languages: Option<String>,
    upscale: bool,
}

impl TesseractDetector {
    pub fn new(languages: Option<String>, upscale: bool) -> Self {
        Self { languages, upscale }
    }

    fn languages_for(&self, source_lang: &str) -> String {
        self.languages
            .clone()
            .unwrap_or_else(|| languages::map_lang_for_tesseract(source_lang).to_string())
    }
}

impl RegionDetector for TesseractDetector {
    fn detect(&self, image: &DynamicImage, source_lang: &str) -> LocalizeResult<Vec<RawTextBox>> {
        let langs = self.languages_for(source_lang);
        let lines = engine::extract_lines(image, &langs, self.upscale)
            .map_err(|err| ErrorKind::DetectionFailure(format!("{:#}", err)))?;
        debug!(languages = %langs, lines = lines.len(), "tesseract detection finished");
        Ok(lines
            .into_iter()
            .map(|line| {
                let x1 = line.bbox.x as f32;
                let y1 = line.bbox.y as f32;
                let x2 = line.bbox.right() as f32;
                let y2 = line.bbox.bottom() as f32;
                RawTextBox {
                    polygon: vec![
                        Point::new(x1, y1),
                        Point::new(x2, y1),
                        Point::new(x2, y2),
                        Point::new(x1, y2),
                    ],
                    text: line.text,
                    confidence: (line.conf / 100.0).clamp(0.0, 1.0),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_is_mean_of_points() {
        let raw = RawTextBox {
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 4.0),
                Point::new(0.0, 4.0),
            ],
            text: "hi".into(),
            confidence: 1.0,
        };
        assert_eq!(raw.centroid(), Some(Point::new(5.0, 2.0)));
    }

    #[test]
    fn empty_polygon_has_no_centroid() {
        let raw = RawTextBox {
            polygon: Vec::new(),
            text: String::new(),
            confidence: 0.0,
        };
        assert_eq!(raw.centroid(), None);
    }

    #[test]
    fn explicit_languages_override_source_mapping() {
        let detector = TesseractDetector::new(Some("jpn_vert".into()), true);
        assert_eq!(detector.languages_for("en"), "jpn_vert");
        let detector = TesseractDetector::new(None, true);
        assert_eq!(detector.languages_for("ko"), "kor");
    }
}

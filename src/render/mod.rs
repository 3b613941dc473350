mod compose;
mod font;
mod layout;

use image::RgbaImage;
use tracing::debug;

use crate::bubbles::BubbleBounds;
use crate::error::{ErrorKind, LocalizeResult};

pub(crate) use compose::{escape_xml, render_svg_png};
pub use compose::LaidOutText;
pub use font::{FontMetrics, OverlayFonts, ResolvedOverlayFont, load_font_metrics};
pub use layout::{
    FALLBACK_FONT_SIZE, FALLBACK_LINE_HEIGHT, FittedText, MAX_FONT_SIZE, MIN_BUBBLE_SIDE,
    MIN_FONT_SIZE, PlacedLine, TextMeasure, fit_text, is_rtl, place_lines, wrap_columns,
    wrap_text,
};

/// Result of drawing a page's bubbles.
#[derive(Debug)]
pub struct DrawOutcome {
    pub image: RgbaImage,
    pub drawn: usize,
    /// Bubbles under the minimum size that received no text.
    pub skipped: usize,
    /// Bubbles that used the fallback layout.
    pub overflowed: usize,
}

/// Fits and draws translated text into bubble boxes.
#[derive(Clone)]
pub struct TextRenderer {
    fonts: OverlayFonts,
    text_color: String,
}

impl TextRenderer {
    pub fn new(fonts: OverlayFonts, text_color: impl Into<String>) -> Self {
        Self {
            fonts,
            text_color: text_color.into(),
        }
    }

    pub fn fonts(&self) -> &OverlayFonts {
        &self.fonts
    }

    /// Layout for one bubble; `None` when the bubble is too small to hold text.
    pub fn layout(&self, text: &str, bounds: &BubbleBounds) -> Option<LaidOutText> {
        let fitted = fit_text(text, bounds, &self.fonts)?;
        let lines = place_lines(&fitted, bounds, &self.fonts);
        Some(LaidOutText { fitted, lines })
    }

    /// Draws every `(bounds, text)` pair onto `canvas`, in order.
    pub fn draw(
        &self,
        image_name: &str,
        canvas: RgbaImage,
        bubbles: &[(BubbleBounds, String)],
    ) -> LocalizeResult<DrawOutcome> {
        let (width, height) = canvas.dimensions();
        let mut blocks = Vec::with_capacity(bubbles.len());
        let mut skipped = 0usize;
        for (bounds, text) in bubbles {
            match self.layout(text, bounds) {
                Some(block) => blocks.push(block),
                None => skipped += 1,
            }
        }
        let overflowed = blocks.iter().filter(|block| !block.fitted.fits).count();
        let drawn = blocks.len();
        debug!(image = image_name, drawn, skipped, overflowed, "laid out bubble text");

        if blocks.iter().all(|block| block.lines.is_empty()) {
            return Ok(DrawOutcome {
                image: canvas,
                drawn,
                skipped,
                overflowed,
            });
        }

        let svg = compose::build_text_svg(width, height, &blocks, &self.fonts, &self.text_color);
        let image = compose::composite_svg(canvas, &svg, self.fonts.database()).map_err(|err| {
            ErrorKind::Encode {
                name: image_name.to_string(),
                reason: format!("{:#}", err),
            }
        })?;
        Ok(DrawOutcome {
            image,
            drawn,
            skipped,
            overflowed,
        })
    }
}

impl TextMeasure for TextRenderer {
    fn line_width(&self, line: &str, font_size: f32, rtl: bool) -> f32 {
        self.fonts.line_width(line, font_size, rtl)
    }

    fn ascent(&self, font_size: f32, rtl: bool) -> f32 {
        self.fonts.ascent(font_size, rtl)
    }
}

use anyhow::{Result, anyhow};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::debug;

use crate::bubbles::{DEFAULT_CLUSTER_THRESHOLD, DEFAULT_MASK_MARGIN};
use crate::error::LocalizeResult;
use crate::ocr::{OcrDebugConfig, RegionDetector, TesseractDetector};
use crate::providers::{TextTranslator, build_translator};
use crate::render::{OverlayFonts, TextRenderer};
use crate::settings::{InpaintBackend, Settings};

mod command;
mod fill;
mod whisper;

pub use command::{CommandColorizer, CommandInpainter};
pub(crate) use command::command_exists;
pub use fill::FillInpainter;
pub use whisper::WhisperTranscriber;

/// Removes the masked regions of a page.
///
/// Mask pixels above zero mark text to erase; the result has the same size
/// as the input.
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> LocalizeResult<RgbaImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorizeOptions {
    pub width: u32,
    pub denoise: bool,
    pub sigma: u32,
}

impl ColorizeOptions {
    pub fn for_width(image_width: u32, denoise: bool, sigma: u32) -> Self {
        Self {
            width: colorize_width(image_width),
            denoise,
            sigma,
        }
    }
}

/// Image width rounded down to a multiple of 32, never below 32.
pub fn colorize_width(width: u32) -> u32 {
    (width / 32 * 32).max(32)
}

pub trait Colorizer: Send + Sync {
    fn colorize(&self, image: &RgbaImage, options: &ColorizeOptions)
    -> LocalizeResult<RgbaImage>;
}

/// One transcribed span, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

pub type TranscribeFuture<'a> =
    Pin<Box<dyn Future<Output = LocalizeResult<Vec<CaptionSegment>>> + Send + 'a>>;

/// Speech-to-text over a media file, in playback order.
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(&'a self, media: &'a Path, source_lang: &'a str) -> TranscribeFuture<'a>;
}

/// Every model handle one scan or render needs, built once per invocation.
pub struct ModelContext {
    pub detector: Box<dyn RegionDetector>,
    pub translator: Box<dyn TextTranslator>,
    pub inpainter: Option<Box<dyn Inpainter>>,
    pub colorizer: Option<Box<dyn Colorizer>>,
    pub transcriber: Option<Box<dyn Transcriber>>,
    pub renderer: TextRenderer,
    pub cluster_threshold: f32,
    pub mask_margin: i32,
    pub colorize_denoise: bool,
    pub colorize_sigma: u32,
    pub ocr_debug: Option<OcrDebugConfig>,
}

impl ModelContext {
    /// Context with only the mandatory handles; everything optional is off.
    pub fn new(
        detector: Box<dyn RegionDetector>,
        translator: Box<dyn TextTranslator>,
        renderer: TextRenderer,
    ) -> Self {
        Self {
            detector,
            translator,
            inpainter: None,
            colorizer: None,
            transcriber: None,
            renderer,
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
            mask_margin: DEFAULT_MASK_MARGIN,
            colorize_denoise: true,
            colorize_sigma: 25,
            ocr_debug: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let detector = TesseractDetector::new(settings.ocr_languages.clone(), settings.ocr_upscale);
        let translator = build_translator(settings)?;
        let renderer = TextRenderer::new(OverlayFonts::load(settings), settings.text_color.clone());

        let inpainter: Option<Box<dyn Inpainter>> = match settings.inpaint_backend {
            InpaintBackend::Fill => Some(Box::new(FillInpainter::default())),
            InpaintBackend::Command => {
                if settings.inpaint_command.is_empty() {
                    return Err(anyhow!("inpaint backend 'command' requires inpaint.command"));
                }
                Some(Box::new(CommandInpainter::new(settings.inpaint_command.clone())))
            }
            InpaintBackend::None => None,
        };
        let colorizer: Option<Box<dyn Colorizer>> = if settings.colorize_command.is_empty() {
            None
        } else {
            Some(Box::new(CommandColorizer::new(settings.colorize_command.clone())))
        };
        debug!(
            inpaint = ?settings.inpaint_backend,
            colorize = colorizer.is_some(),
            provider = %settings.translate_provider,
            "model context ready"
        );

        let mut context = Self::new(Box::new(detector), Box::new(translator), renderer);
        context.inpainter = inpainter;
        context.colorizer = colorizer;
        context.transcriber = Some(Box::new(WhisperTranscriber::new(
            settings.whisper_model.clone(),
        )));
        context.cluster_threshold = settings.cluster_threshold;
        context.mask_margin = settings.mask_margin;
        context.colorize_denoise = settings.colorize_denoise;
        context.colorize_sigma = settings.colorize_sigma;
        Ok(context)
    }

    pub fn with_inpainter(mut self, inpainter: impl Inpainter + 'static) -> Self {
        self.inpainter = Some(Box::new(inpainter));
        self
    }

    pub fn with_colorizer(mut self, colorizer: impl Colorizer + 'static) -> Self {
        self.colorizer = Some(Box::new(colorizer));
        self
    }

    pub fn with_transcriber(mut self, transcriber: impl Transcriber + 'static) -> Self {
        self.transcriber = Some(Box::new(transcriber));
        self
    }

    pub fn with_ocr_debug(mut self, config: OcrDebugConfig) -> Self {
        self.ocr_debug = Some(config);
        self
    }

    pub fn colorize_options(&self, image_width: u32) -> ColorizeOptions {
        ColorizeOptions::for_width(image_width, self.colorize_denoise, self.colorize_sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorize_width_floors_to_multiple_of_32() {
        assert_eq!(colorize_width(800), 800);
        assert_eq!(colorize_width(815), 800);
        assert_eq!(colorize_width(831), 800);
        assert_eq!(colorize_width(832), 832);
        assert_eq!(colorize_width(20), 32);
    }

    #[test]
    fn colorize_options_carry_settings() {
        let options = ColorizeOptions::for_width(1000, true, 25);
        assert_eq!(
            options,
            ColorizeOptions {
                width: 992,
                denoise: true,
                sigma: 25
            }
        );
    }
}

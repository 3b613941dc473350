use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::{debug, info, warn};

use super::{
    Modification, PageState, RenderOutput, ReviewItem, ReviewState, ScanOutput,
    resolve_page_texts,
};
use crate::bubbles::{
    BubbleBounds, BubbleGroup, build_mask, group_boxes, reconstruct, sanitize_for_source,
};
use crate::data::{self, InputFiles};
use crate::error::{ErrorKind, LocalizeResult};
use crate::models::ModelContext;
use crate::ocr::write_debug_overlay;
use crate::providers::translate_or_keep;

/// Scan and render for image pages; `colorize` selects the `both` flavour.
#[derive(Debug, Clone, Copy)]
pub struct ImageStage {
    colorize: bool,
}

impl ImageStage {
    pub fn translate() -> Self {
        Self { colorize: false }
    }

    pub fn colorize() -> Self {
        Self { colorize: true }
    }

    /// Detects, groups, reconstructs and translates every page, in input
    /// order. Nothing is drawn.
    pub async fn scan(
        &self,
        context: &ModelContext,
        inputs: &InputFiles,
        source_lang: &str,
        target_lang: &str,
    ) -> LocalizeResult<ScanOutput> {
        let mut review_items = Vec::new();
        let mut pages = Vec::new();
        let mut diagnostics = Vec::new();

        for (name, bytes) in inputs {
            if data::is_video(name, bytes) {
                debug!(file = %name, "skipping video input in image scan");
                continue;
            }
            let image = match decode(name, bytes) {
                Ok(image) => image,
                Err(err) => {
                    warn!(error = %err, "dropping undecodable page");
                    diagnostics.push(err.to_string());
                    continue;
                }
            };

            let groups = self.detect_groups(context, name, bytes, &image, source_lang, &mut diagnostics);
            let mut page = PageState {
                image_name: name.clone(),
                groups: Vec::with_capacity(groups.len()),
                originals: Vec::with_capacity(groups.len()),
                translated_texts: Vec::with_capacity(groups.len()),
            };
            for group in &groups {
                let parts = group
                    .texts()
                    .map(|text| sanitize_for_source(text, source_lang))
                    .collect::<Vec<_>>();
                // Boxes that sanitize to nothing still join with spaces.
                let original = reconstruct(&parts).trim().to_string();
                let translated = if original.is_empty() {
                    String::new()
                } else {
                    translate_or_keep(
                        context.translator.as_ref(),
                        &original,
                        source_lang,
                        target_lang,
                        &mut diagnostics,
                    )
                    .await
                };
                review_items.push(ReviewItem {
                    id: review_items.len(),
                    image_name: name.clone(),
                    original: original.clone(),
                    translated: translated.clone(),
                });
                page.groups.push(group.polygons());
                page.originals.push(original);
                page.translated_texts.push(translated);
            }
            info!(page = %name, bubbles = page.groups.len(), "scanned page");
            pages.push(page);
        }

        let state = if self.colorize {
            ReviewState::Both { pages }
        } else {
            ReviewState::Translate { pages }
        };
        Ok(ScanOutput {
            review_items,
            state,
            diagnostics,
        })
    }

    fn detect_groups(
        &self,
        context: &ModelContext,
        name: &str,
        bytes: &[u8],
        image: &DynamicImage,
        source_lang: &str,
        diagnostics: &mut Vec<String>,
    ) -> Vec<BubbleGroup> {
        let boxes = match context.detector.detect(image, source_lang) {
            Ok(boxes) => boxes,
            Err(err) => {
                warn!(page = %name, error = %err, "detection failed; treating page as textless");
                diagnostics.push(format!("{}: {}", name, err));
                return Vec::new();
            }
        };
        // A single box is too little to call a bubble.
        if boxes.len() <= 1 {
            debug!(page = %name, boxes = boxes.len(), "not enough text boxes");
            return Vec::new();
        }

        let debug_boxes = context.ocr_debug.as_ref().map(|_| boxes.clone());
        let groups = group_boxes(boxes, context.cluster_threshold);
        if let (Some(config), Some(raw)) = (&context.ocr_debug, debug_boxes) {
            let bounds = groups.iter().map(|group| group.bounds).collect::<Vec<_>>();
            if let Err(err) = write_debug_overlay(
                config,
                name,
                bytes,
                image.width(),
                image.height(),
                &raw,
                &bounds,
            ) {
                warn!(page = %name, error = %err, "failed to write ocr debug overlay");
            }
        }
        groups
    }

    /// Erases, redraws and (for `both`) colorizes every page in the snapshot.
    pub fn render(
        &self,
        context: &ModelContext,
        inputs: &InputFiles,
        pages: &[PageState],
        modifications: &[Modification],
    ) -> LocalizeResult<RenderOutput> {
        let texts = resolve_page_texts(pages, modifications);
        let mut output = RenderOutput::default();

        for (page, texts) in pages.iter().zip(texts) {
            let name = &page.image_name;
            let Some(bytes) = inputs.get(name) else {
                warn!(page = %name, "page missing from inputs");
                output
                    .diagnostics
                    .push(format!("{}: input file missing at render time", name));
                continue;
            };
            match self.render_page(context, name, bytes, page, &texts, &mut output.diagnostics) {
                Ok(encoded) => {
                    output.outputs.insert(name.clone(), encoded);
                    output.rendered_texts.insert(name.clone(), texts);
                }
                Err(err) if err.is_recoverable() => {
                    warn!(page = %name, error = %err, "dropping page from output");
                    output.diagnostics.push(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(output)
    }

    fn render_page(
        &self,
        context: &ModelContext,
        name: &str,
        bytes: &[u8],
        page: &PageState,
        texts: &[String],
        diagnostics: &mut Vec<String>,
    ) -> LocalizeResult<Vec<u8>> {
        let bubbles = page
            .groups
            .iter()
            .zip(texts)
            .filter_map(|(polygons, text)| {
                BubbleBounds::from_polygons(polygons).map(|bounds| (bounds, text.clone()))
            })
            .collect::<Vec<_>>();

        if bubbles.is_empty() && !self.colorize {
            debug!(page = %name, "no bubbles; passing page through");
            return Ok(bytes.to_vec());
        }

        let original = decode(name, bytes)?.to_rgba8();
        let (width, height) = original.dimensions();
        let mut canvas = None;

        if !bubbles.is_empty() {
            canvas = self.replace_text(context, name, &original, &bubbles, diagnostics);
        }

        if self.colorize {
            let base = canvas.as_ref().unwrap_or(&original);
            match &context.colorizer {
                Some(colorizer) => {
                    match colorizer.colorize(base, &context.colorize_options(width)) {
                        Ok(colored) => canvas = Some(colored),
                        Err(err) => {
                            warn!(page = %name, error = %err, "colorization failed; keeping uncolored page");
                            diagnostics.push(format!("{}: {}", name, err));
                        }
                    }
                }
                None => {
                    let err = ErrorKind::ColorizationFailure("no colorizer configured".into());
                    warn!(page = %name, "no colorizer configured; keeping uncolored page");
                    diagnostics.push(format!("{}: {}", name, err));
                }
            }
        }

        match canvas {
            Some(image) => {
                debug!(page = %name, width, height, "encoding rendered page");
                encode(name, bytes, image)
            }
            None => Ok(bytes.to_vec()),
        }
    }

    /// Inpaints under the bubble masks and draws the new text. `None` when the
    /// page has to stay as it was.
    fn replace_text(
        &self,
        context: &ModelContext,
        name: &str,
        original: &RgbaImage,
        bubbles: &[(BubbleBounds, String)],
        diagnostics: &mut Vec<String>,
    ) -> Option<RgbaImage> {
        let Some(inpainter) = &context.inpainter else {
            let err = ErrorKind::InpaintingUnavailable("no inpainter configured".into());
            warn!(page = %name, "no inpainter configured; leaving text in place");
            diagnostics.push(format!("{}: {}", name, err));
            return None;
        };
        let (width, height) = original.dimensions();
        let bounds = bubbles.iter().map(|(bounds, _)| *bounds).collect::<Vec<_>>();
        let mask = build_mask(&bounds, context.mask_margin, width, height);

        let inpainted = match inpainter.inpaint(original, &mask) {
            Ok(image) => image,
            Err(err) => {
                warn!(page = %name, error = %err, "inpainting failed; leaving text in place");
                diagnostics.push(format!("{}: {}", name, err));
                return None;
            }
        };

        match context.renderer.draw(name, inpainted, bubbles) {
            Ok(outcome) => {
                if outcome.overflowed > 0 {
                    debug!(page = %name, overflowed = outcome.overflowed, "some bubbles used the fallback layout");
                }
                info!(page = %name, drawn = outcome.drawn, skipped = outcome.skipped, "rendered page");
                Some(outcome.image)
            }
            Err(err) => {
                warn!(page = %name, error = %err, "drawing failed; leaving text in place");
                diagnostics.push(err.to_string());
                None
            }
        }
    }
}

fn decode(name: &str, bytes: &[u8]) -> LocalizeResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|err| ErrorKind::InvalidImage {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

/// Encodes into the input's own container; formats without alpha get RGB.
fn encode(name: &str, source: &[u8], image: RgbaImage) -> LocalizeResult<Vec<u8>> {
    let format = data::image_format_for(name, source);
    let image = DynamicImage::ImageRgba8(image);
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), format)
        .map_err(|err| ErrorKind::Encode {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorizeOptions, Colorizer, FillInpainter};
    use crate::ocr::{Point, RawTextBox, RegionDetector};
    use crate::providers::{TextTranslator, TranslateFuture};
    use crate::render::{OverlayFonts, TextRenderer};
    use image::Rgba;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Boxes(Vec<RawTextBox>);

    impl RegionDetector for Boxes {
        fn detect(&self, _: &DynamicImage, _: &str) -> LocalizeResult<Vec<RawTextBox>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl RegionDetector for Broken {
        fn detect(&self, _: &DynamicImage, _: &str) -> LocalizeResult<Vec<RawTextBox>> {
            Err(ErrorKind::DetectionFailure("model missing".into()))
        }
    }

    struct Shout;

    impl TextTranslator for Shout {
        fn translate<'a>(&'a self, text: &'a str, _: &'a str, _: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move { Ok::<_, ErrorKind>(text.to_uppercase()) })
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl TextTranslator for Counting {
        fn translate<'a>(&'a self, text: &'a str, _: &'a str, _: &'a str) -> TranslateFuture<'a> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok::<_, ErrorKind>(format!("T({})", text)) })
        }
    }

    struct Sepia;

    impl Colorizer for Sepia {
        fn colorize(&self, image: &RgbaImage, _: &ColorizeOptions) -> LocalizeResult<RgbaImage> {
            let mut out = image.clone();
            for px in out.pixels_mut() {
                px.0[2] = 0;
            }
            Ok(out)
        }
    }

    fn word(x: f32, y: f32, text: &str) -> RawTextBox {
        RawTextBox {
            polygon: vec![
                Point::new(x, y),
                Point::new(x + 40.0, y),
                Point::new(x + 40.0, y + 12.0),
                Point::new(x, y + 12.0),
            ],
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    fn context(detector: impl RegionDetector + 'static) -> ModelContext {
        ModelContext::new(
            Box::new(detector),
            Box::new(Shout),
            TextRenderer::new(OverlayFonts::empty(), "#000000"),
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn inputs(names: &[&str]) -> InputFiles {
        names
            .iter()
            .map(|name| (name.to_string(), png(300, 200)))
            .collect::<BTreeMap<_, _>>()
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn scan_assigns_ids_across_pages() {
        let ctx = context(Boxes(vec![
            word(100.0, 50.0, "co-"),
            word(110.0, 60.0, "operate"),
            word(240.0, 150.0, "NOW!"),
        ]));
        let inputs = inputs(&["a.png", "b.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();

        let ids = scan.review_items.iter().map(|item| item.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(scan.review_items[0].original, "cooperate");
        assert_eq!(scan.review_items[0].translated, "COOPERATE");
        assert_eq!(scan.review_items[3].image_name, "b.png");
        assert_eq!(scan.state.review_items(), scan.review_items);
    }

    #[test]
    fn single_box_pages_have_no_bubbles() {
        let ctx = context(Boxes(vec![word(10.0, 10.0, "lonely")]));
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        assert!(scan.review_items.is_empty());
        let ReviewState::Translate { pages } = &scan.state else {
            panic!("wrong state kind");
        };
        assert_eq!(pages.len(), 1);
        assert!(pages[0].groups.is_empty());
    }

    #[test]
    fn detection_failure_is_absorbed() {
        let ctx = context(Broken);
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        assert!(scan.review_items.is_empty());
        assert_eq!(scan.diagnostics.len(), 1);
    }

    #[test]
    fn textless_pages_pass_through_unchanged() {
        let ctx = context(Boxes(Vec::new())).with_inpainter(FillInpainter::default());
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        assert_eq!(out.outputs["a.png"], inputs["a.png"]);
    }

    #[test]
    fn missing_inpainter_keeps_page_and_reports() {
        let ctx = context(Boxes(vec![word(100.0, 50.0, "hello"), word(110.0, 62.0, "there")]));
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        assert_eq!(out.outputs["a.png"], inputs["a.png"]);
        assert!(out.diagnostics.iter().any(|d| d.contains("inpainting unavailable")));
    }

    #[test]
    fn both_colorizes_textless_pages() {
        let ctx = context(Boxes(Vec::new())).with_colorizer(Sepia);
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::colorize().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        let image = image::load_from_memory(&out.outputs["a.png"]).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0), &Rgba([200, 200, 0, 255]));
    }

    #[test]
    fn both_without_colorizer_emits_uncolored_page() {
        let ctx = context(Boxes(Vec::new()));
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::colorize().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        let image = image::load_from_memory(&out.outputs["a.png"]).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0), &Rgba([200, 200, 200, 255]));
        assert!(out.diagnostics.iter().any(|d| d.contains("colorization failed")));
    }

    #[test]
    fn mask_region_is_inpainted_and_outside_is_kept() {
        let ctx = context(Boxes(vec![word(100.0, 50.0, "hello"), word(110.0, 62.0, "there")]))
            .with_inpainter(FillInpainter::new(Rgba([255, 0, 255, 255])));
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        let image = image::load_from_memory(&out.outputs["a.png"]).unwrap().to_rgba8();
        // Group envelope is (100,50)-(150,74); the mask reaches 7 px beyond it.
        assert_eq!(image.get_pixel(5, 5), &Rgba([200, 200, 200, 255]));
        assert_eq!(image.get_pixel(92, 42), &Rgba([200, 200, 200, 255]));
        assert_eq!(image.get_pixel(94, 44)[1], 0);
        assert_eq!(image.get_pixel(155, 79)[1], 0);
        assert_eq!(image.get_pixel(157, 81), &Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn single_line_bubble_loses_its_source_text() {
        let ctx = context(Boxes(vec![word(100.0, 50.0, "hey"), word(150.0, 50.0, "you")]))
            .with_inpainter(FillInpainter::default());
        let mut page = RgbaImage::from_pixel(300, 200, Rgba([200, 200, 200, 255]));
        page.put_pixel(120, 56, Rgba([0, 0, 0, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(page)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let inputs = BTreeMap::from([("a.png".to_string(), bytes)]);

        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        assert_eq!(scan.review_items.len(), 1);
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        let image = image::load_from_memory(&out.outputs["a.png"]).unwrap().to_rgba8();
        assert_ne!(image.get_pixel(120, 56), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn symbol_only_bubbles_are_not_translated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = ModelContext::new(
            Box::new(Boxes(vec![word(100.0, 50.0, "⚡"), word(110.0, 62.0, "★")])),
            Box::new(Counting(calls.clone())),
            TextRenderer::new(OverlayFonts::empty(), "#000000"),
        );
        let inputs = inputs(&["a.png"]);
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scan.review_items.len(), 1);
        assert_eq!(scan.review_items[0].original, "");
        assert_eq!(scan.review_items[0].translated, "");
    }

    #[test]
    fn undecodable_pages_are_dropped() {
        let ctx = context(Boxes(Vec::new()));
        let mut inputs = inputs(&["a.png"]);
        inputs.insert("broken.png".into(), b"not an image".to_vec());
        let scan = block_on(ImageStage::translate().scan(&ctx, &inputs, "en", "fr")).unwrap();
        let out = scan.state.render(&ctx, &inputs, &[]).unwrap();
        assert!(out.outputs.contains_key("a.png"));
        assert!(!out.outputs.contains_key("broken.png"));
        assert_eq!(scan.diagnostics.len(), 1);
    }
}

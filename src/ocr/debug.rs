use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::{Path, PathBuf};
use tracing::info;

use super::RawTextBox;
use crate::bubbles::BubbleBounds;
use crate::paths;
use crate::render::{OverlayFonts, escape_xml, render_svg_png};

/// Where per-page detection overlays are written.
#[derive(Debug, Clone)]
pub struct OcrDebugConfig {
    output_dir: PathBuf,
}

impl OcrDebugConfig {
    pub fn new(output_dir: Option<&Path>) -> Result<Self> {
        let dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(paths::ocr_debug_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create debug dir: {}", dir.display()))?;
        Ok(Self { output_dir: dir })
    }

    pub fn output_path(&self, image_name: &str) -> PathBuf {
        let stem = Path::new(image_name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("input");
        self.output_dir
            .join(format!("{}_ocr_bbox.png", sanitize_filename_component(stem)))
    }
}

/// Writes the page with detected boxes (green) and bubble envelopes (red).
pub fn write_debug_overlay(
    config: &OcrDebugConfig,
    image_name: &str,
    image_bytes: &[u8],
    width: u32,
    height: u32,
    boxes: &[RawTextBox],
    groups: &[BubbleBounds],
) -> Result<PathBuf> {
    let svg = render_bbox_svg(image_bytes, width, height, boxes, groups);
    let png = render_svg_png(&svg, OverlayFonts::empty().database())?;
    let path = config.output_path(image_name);
    std::fs::write(&path, png)
        .with_context(|| format!("failed to write debug overlay: {}", path.display()))?;
    info!(path = %path.display(), "wrote ocr debug overlay");
    Ok(path)
}

fn render_bbox_svg(
    image_bytes: &[u8],
    width: u32,
    height: u32,
    boxes: &[RawTextBox],
    groups: &[BubbleBounds],
) -> String {
    let mime = infer::get(image_bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("image/png");
    let data_uri = format!("data:{};base64,{}", mime, BASE64.encode(image_bytes));

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = escape_xml(&data_uri),
        w = width,
        h = height
    ));

    for raw in boxes {
        let points = raw
            .polygon
            .iter()
            .map(|p| format!("{},{}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        svg.push_str(&format!(
            r##"<polygon points="{points}" fill="none" stroke="#00c853" stroke-width="2"/>"##
        ));
    }
    for bounds in groups {
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#d50000" stroke-width="2"/>"##,
            x = bounds.x1,
            y = bounds.y1,
            w = bounds.width().max(0),
            h = bounds.height().max(0)
        ));
    }

    svg.push_str("</svg>");
    svg
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() {
        "input".to_string()
    } else {
        out
    }
}

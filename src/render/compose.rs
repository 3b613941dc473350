use anyhow::{Context, Result, anyhow};
use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap, Transform};
use usvg::{Options, Tree, fontdb};

use super::font::OverlayFonts;
use super::layout::{FittedText, PlacedLine, TextMeasure};

/// One bubble's fitted lines ready to draw.
#[derive(Debug, Clone)]
pub struct LaidOutText {
    pub fitted: FittedText,
    pub lines: Vec<PlacedLine>,
}

/// SVG layer (no background) holding every line, each centered on its own
/// measured box.
pub(crate) fn build_text_svg(
    width: u32,
    height: u32,
    blocks: &[LaidOutText],
    fonts: &OverlayFonts,
    text_color: &str,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    for block in blocks {
        let size = block.fitted.font_size;
        let rtl = block.fitted.rtl;
        let family = escape_xml(fonts.family_for(rtl));
        let ascent = fonts.ascent(size, rtl);
        for line in &block.lines {
            let direction = if rtl { r#" direction="rtl""# } else { "" };
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{color}" text-anchor="middle"{direction}>{text}</text>"#,
                x = line.x + line.width / 2.0,
                y = line.y + ascent,
                size = size,
                family = family,
                color = escape_xml(text_color),
                direction = direction,
                text = escape_xml(&line.text)
            ));
        }
    }
    svg.push_str("</svg>");
    svg
}

/// Rasterizes `svg` over `canvas`.
pub(crate) fn composite_svg(
    canvas: RgbaImage,
    svg: &str,
    db: Arc<fontdb::Database>,
) -> Result<RgbaImage> {
    let (width, height) = canvas.dimensions();
    let size = IntSize::from_wh(width, height).ok_or_else(|| anyhow!("empty canvas"))?;
    let tree = parse_svg(svg, db)?;

    let mut data = canvas.into_raw();
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        for channel in &mut px[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
    let mut pixmap =
        Pixmap::from_vec(data, size).ok_or_else(|| anyhow!("failed to wrap canvas in pixmap"))?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());
    Ok(pixmap_to_image(&pixmap))
}

/// Renders a standalone SVG document to PNG bytes.
pub(crate) fn render_svg_png(svg: &str, db: Arc<fontdb::Database>) -> Result<Vec<u8>> {
    let tree = parse_svg(svg, db)?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());
    let image = pixmap_to_image(&pixmap);
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode image from SVG")?;
    Ok(bytes)
}

fn parse_svg(svg: &str, db: Arc<fontdb::Database>) -> Result<Tree> {
    let options = Options {
        fontdb: db,
        ..Options::default()
    };
    Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")
}

fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (src, dst) in pixmap.pixels().iter().zip(image.pixels_mut()) {
        let color = src.demultiply();
        *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

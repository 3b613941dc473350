use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::{Face, name_id};
use usvg::{Options, Tree, fontdb};

use super::compose::escape_xml;
use super::layout::TextMeasure;
use crate::settings::Settings;

const LATIN_FALLBACK_FAMILIES: &[&str] = &[
    "Anime Ace",
    "Comic Neue",
    "DejaVu Sans",
    "Noto Sans",
    "Liberation Sans",
    "sans-serif",
];
const RTL_FALLBACK_FAMILIES: &[&str] = &[
    "Amiri",
    "Noto Naskh Arabic",
    "Noto Sans Arabic",
    "DejaVu Sans",
    "sans-serif",
];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn ascent_px(&self, font_size: f32) -> f32 {
        self.ascender.max(0) as f32 * font_size / self.units_per_em.max(1) as f32
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

#[derive(Debug, Clone)]
pub struct ResolvedOverlayFont {
    pub metrics: FontMetrics,
    pub family: String,
}

pub fn resolve_overlay_font(
    db: &fontdb::Database,
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<ResolvedOverlayFont> {
    if let Some(path) = font_path {
        let metrics = load_font_metrics(path)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "sans-serif".to_string());
        return Ok(ResolvedOverlayFont { metrics, family });
    }

    if let Some(family) = font_family {
        return load_font_metrics_from_family(db, family);
    }

    for candidate in fallback {
        if let Ok(resolved) = load_font_metrics_from_family(db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!("no fallback fonts found"))
}

/// Advance-width sum from the font's horizontal metrics, or a per-character
/// estimate without a font.
pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                let glyph_advance = face
                    .glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(font.space_advance);
                advance = advance.saturating_add(glyph_advance as u32);
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_size / units);
        }
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_uppercase() {
        0.65
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF
    ) {
        1.0
    } else {
        0.6
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

/// Fonts used to draw translated text: one for left-to-right scripts and one
/// for Arabic, sharing a font database with the rasterizer.
#[derive(Clone)]
pub struct OverlayFonts {
    db: Arc<fontdb::Database>,
    latin: Option<ResolvedOverlayFont>,
    rtl: Option<ResolvedOverlayFont>,
}

impl OverlayFonts {
    /// Loads system fonts plus any configured font files. A font that cannot be
    /// resolved leaves width estimation to the per-character fallback.
    pub fn load(settings: &Settings) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let latin = resolve_logged(
            &db,
            settings.font_path.as_deref(),
            settings.font_family.as_deref(),
            LATIN_FALLBACK_FAMILIES,
            "latin",
        );
        let rtl = resolve_logged(
            &db,
            settings.rtl_font_path.as_deref(),
            settings.rtl_font_family.as_deref(),
            RTL_FALLBACK_FAMILIES,
            "rtl",
        );
        for resolved in [&latin, &rtl].into_iter().flatten() {
            db.load_font_data(resolved.metrics.data().to_vec());
        }

        Self {
            db: Arc::new(db),
            latin,
            rtl,
        }
    }

    /// No fonts at all; widths are estimated and nothing is shaped.
    pub fn empty() -> Self {
        Self {
            db: Arc::new(fontdb::Database::new()),
            latin: None,
            rtl: None,
        }
    }

    pub fn database(&self) -> Arc<fontdb::Database> {
        self.db.clone()
    }

    pub fn font_for(&self, rtl: bool) -> Option<&ResolvedOverlayFont> {
        if rtl {
            self.rtl.as_ref().or(self.latin.as_ref())
        } else {
            self.latin.as_ref()
        }
    }

    pub fn family_for(&self, rtl: bool) -> &str {
        self.font_for(rtl)
            .map(|font| font.family.as_str())
            .unwrap_or("sans-serif")
    }

    /// Width of a shaped line as laid out by usvg (Arabic joining and bidi
    /// reordering applied).
    fn shaped_width(&self, line: &str, font_size: f32) -> Option<f32> {
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="4096" height="512"><text x="2048" y="{y}" font-size="{size}" font-family="{family}" direction="rtl" text-anchor="middle">{text}</text></svg>"#,
            y = font_size * 2.0,
            size = font_size,
            family = escape_xml(self.family_for(true)),
            text = escape_xml(line),
        );
        let options = Options {
            fontdb: self.db.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).ok()?;
        let width = tree.root().bounding_box().width();
        (width > 0.0).then_some(width)
    }
}

impl TextMeasure for OverlayFonts {
    fn line_width(&self, line: &str, font_size: f32, rtl: bool) -> f32 {
        if rtl && self.font_for(true).is_some() {
            if let Some(width) = self.shaped_width(line, font_size) {
                return width;
            }
        }
        measure_text_width_px(line, font_size, self.font_for(rtl).map(|font| &font.metrics))
    }

    fn ascent(&self, font_size: f32, rtl: bool) -> f32 {
        self.font_for(rtl)
            .map(|font| font.metrics.ascent_px(font_size))
            .filter(|ascent| *ascent > 0.0)
            .unwrap_or(font_size * 0.8)
    }
}

fn resolve_logged(
    db: &fontdb::Database,
    path: Option<&str>,
    family: Option<&str>,
    fallback: &[&str],
    label: &str,
) -> Option<ResolvedOverlayFont> {
    match resolve_overlay_font(db, path.map(Path::new), family, fallback) {
        Ok(resolved) => {
            debug!(font = %resolved.family, kind = label, "resolved overlay font");
            Some(resolved)
        }
        Err(err) => {
            warn!(error = %err, kind = label, "overlay font unavailable; using width estimates");
            None
        }
    }
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    let shared = Arc::new(data.to_vec());
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: shared.clone(),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(
    db: &fontdb::Database,
    family: &str,
) -> Result<ResolvedOverlayFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, Some(family))?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedOverlayFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_font_size() {
        let small = measure_text_width_px("hello", 10.0, None);
        let large = measure_text_width_px("hello", 20.0, None);
        assert!((large - small * 2.0).abs() < 1e-4);
        assert!(small > 0.0);
    }

    #[test]
    fn empty_fonts_fall_back_to_estimates() {
        let fonts = OverlayFonts::empty();
        assert!(fonts.font_for(false).is_none());
        assert_eq!(fonts.family_for(true), "sans-serif");
        let width = fonts.line_width("مرحبا", 20.0, true);
        assert!(width > 0.0);
        assert_eq!(fonts.ascent(20.0, false), 16.0);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let db = fontdb::Database::new();
        let result = resolve_overlay_font(&db, Some(Path::new("/nonexistent/font.ttf")), None, &[]);
        assert!(result.is_err());
    }
}

use crate::bubbles::BubbleBounds;

pub const MAX_FONT_SIZE: u32 = 40;
pub const MIN_FONT_SIZE: u32 = 8;
pub const FONT_SIZE_STEP: usize = 2;
pub const LINE_GAP: f32 = 6.0;
pub const FALLBACK_FONT_SIZE: f32 = 10.0;
pub const FALLBACK_LINE_HEIGHT: f32 = 14.0;
pub const FALLBACK_CHAR_WIDTH: f32 = 6.0;
pub const MIN_BUBBLE_SIDE: i32 = 10;

/// Pixel width of a rendered line at a font size.
pub trait TextMeasure {
    fn line_width(&self, line: &str, font_size: f32, rtl: bool) -> f32;

    /// Distance from the top of a line box to its baseline.
    fn ascent(&self, font_size: f32, _rtl: bool) -> f32 {
        font_size * 0.8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub font_size: f32,
    pub lines: Vec<String>,
    pub line_height: f32,
    pub rtl: bool,
    /// `false` when no candidate size fit and the fallback layout was used.
    pub fits: bool,
}

impl FittedText {
    pub fn block_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    /// Top of the line box.
    pub y: f32,
    pub width: f32,
}

/// True when the text contains any Arabic-block code point.
pub fn is_rtl(text: &str) -> bool {
    text.chars().any(|ch| ('\u{0600}'..='\u{06FF}').contains(&ch))
}

/// Character columns for a font size: `W / (s * 0.5)`, at least 1.
pub fn wrap_columns(width: f32, font_size: f32) -> usize {
    ((width / (font_size * 0.5)).floor() as usize).max(1)
}

/// Greedy word wrap at `width` characters.
///
/// Words may break after a hyphen between letters (`twenty-` / `one`).
/// Chunks longer than the width are hard-broken; whitespace at line edges is
/// dropped; whitespace-only input yields no lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        for (idx, mut chars) in hyphen_chunks(word).into_iter().enumerate() {
            // Only the first chunk of a word is preceded by a space.
            let sep = usize::from(current_len > 0 && idx == 0);
            if current_len + sep + chars.len() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.extend(chars.iter());
                current_len += sep + chars.len();
                continue;
            }
            if chars.len() > width {
                // Fill the remainder of the current line before breaking the chunk.
                let room = width.saturating_sub(current_len + sep);
                if current_len > 0 && room > 0 {
                    if sep == 1 {
                        current.push(' ');
                    }
                    current.extend(chars.drain(..room));
                }
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                }
                while chars.len() > width {
                    lines.push(chars.drain(..width).collect());
                }
                current = chars.iter().collect();
                current_len = chars.len();
                continue;
            }
            lines.push(std::mem::take(&mut current));
            current = chars.iter().collect();
            current_len = chars.len();
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Splits a word after each hyphen that sits between a letter or digit and a
/// letter.
fn hyphen_chunks(word: &str) -> Vec<Vec<char>> {
    let chars = word.chars().collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut chunk = Vec::new();
    for (idx, &ch) in chars.iter().enumerate() {
        chunk.push(ch);
        let breakable = ch == '-'
            && idx > 0
            && chars[idx - 1].is_alphanumeric()
            && chars.get(idx + 1).is_some_and(|next| next.is_alphabetic());
        if breakable {
            chunks.push(std::mem::take(&mut chunk));
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// Largest font size (40 down to 8, step 2) whose wrapped block fits the box,
/// or the size-10 fallback layout. `None` for boxes under 10 px on either side.
pub fn fit_text(text: &str, bounds: &BubbleBounds, measure: &dyn TextMeasure) -> Option<FittedText> {
    if bounds.width() < MIN_BUBBLE_SIDE || bounds.height() < MIN_BUBBLE_SIDE {
        return None;
    }
    let width = bounds.width() as f32;
    let height = bounds.height() as f32;
    let rtl = is_rtl(text);

    for size in (MIN_FONT_SIZE..=MAX_FONT_SIZE).rev().step_by(FONT_SIZE_STEP) {
        let size = size as f32;
        let lines = wrap_text(text, wrap_columns(width, size));
        let line_height = size + LINE_GAP;
        if lines.len() as f32 * line_height > height {
            continue;
        }
        if lines
            .iter()
            .any(|line| measure.line_width(line, size, rtl) > width)
        {
            continue;
        }
        return Some(FittedText {
            font_size: size,
            lines,
            line_height,
            rtl,
            fits: true,
        });
    }

    let columns = ((width / FALLBACK_CHAR_WIDTH).floor() as usize).max(1);
    Some(FittedText {
        font_size: FALLBACK_FONT_SIZE,
        lines: wrap_text(text, columns),
        line_height: FALLBACK_LINE_HEIGHT,
        rtl,
        fits: false,
    })
}

/// Centers the block vertically in the box and each line horizontally.
pub fn place_lines(
    fitted: &FittedText,
    bounds: &BubbleBounds,
    measure: &dyn TextMeasure,
) -> Vec<PlacedLine> {
    let start_y = ((bounds.y1 + bounds.y2) as f32 - fitted.block_height()) / 2.0;
    fitted
        .lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let width = measure.line_width(line, fitted.font_size, fitted.rtl);
            PlacedLine {
                text: line.clone(),
                x: (((bounds.x1 + bounds.x2) as f32 - width) / 2.0).floor(),
                y: start_y.floor() + idx as f32 * fitted.line_height,
                width,
            }
        })
        .collect()
}

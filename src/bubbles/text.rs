use crate::languages::{self, SourceScript};

/// Strips OCR noise: keeps Arabic, ASCII letters and digits, whitespace and
/// `. ? ! , - ' "`, then collapses runs of whitespace.
pub fn sanitize_ocr_text(text: &str) -> String {
    filter_and_collapse(text, |_| false)
}

/// Like [`sanitize_ocr_text`] but also keeps the source language's script so
/// non-Latin, non-Arabic sources survive.
pub fn sanitize_for_source(text: &str, source_lang: &str) -> String {
    match languages::source_script(source_lang) {
        SourceScript::Arabic | SourceScript::Unknown => sanitize_ocr_text(text),
        SourceScript::Latin => filter_and_collapse(text, is_latin_extended),
        SourceScript::Cjk => filter_and_collapse(text, is_cjk),
        SourceScript::Hangul => filter_and_collapse(text, is_hangul),
        SourceScript::Cyrillic => filter_and_collapse(text, is_cyrillic),
    }
}

/// Joins per-box strings of one bubble into a lower-cased sentence.
///
/// An element containing `-` is a word broken across boxes: its text before the
/// first hyphen is glued to the next element and both are consumed. A trailing
/// hyphenated element keeps only its prefix.
pub fn reconstruct<S: AsRef<str>>(parts: &[S]) -> String {
    let mut fragments = Vec::with_capacity(parts.len());
    let mut i = 0;
    while i < parts.len() {
        let part = parts[i].as_ref();
        if let Some((prefix, _)) = part.split_once('-') {
            if let Some(next) = parts.get(i + 1) {
                fragments.push(format!("{}{}", prefix, next.as_ref()).trim().to_string());
                i += 1;
            } else {
                fragments.push(prefix.trim().to_string());
            }
        } else {
            fragments.push(part.to_string());
        }
        i += 1;
    }
    fragments
        .iter()
        .map(|fragment| fragment.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn filter_and_collapse(text: &str, extra: impl Fn(char) -> bool) -> String {
    let kept = text
        .chars()
        .filter(|&ch| is_base_allowed(ch) || extra(ch))
        .collect::<String>();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_base_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || ch.is_whitespace()
        || matches!(ch, '.' | '?' | '!' | ',' | '-' | '\'' | '"')
        || ('\u{0600}'..='\u{06FF}').contains(&ch)
}

fn is_latin_extended(ch: char) -> bool {
    matches!(ch as u32, 0x00C0..=0x024F) && ch.is_alphabetic()
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xFF00..=0xFFEF
    )
}

fn is_hangul(ch: char) -> bool {
    matches!(ch as u32, 0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF)
}

fn is_cyrillic(ch: char) -> bool {
    matches!(ch as u32, 0x0400..=0x04FF)
}

/// Tesseract traineddata name for a source language code.
pub fn map_lang_for_tesseract(code: &str) -> &'static str {
    match normalize_code(code).as_str() {
        "ar" | "ara" => "ara",
        "en" | "eng" => "eng",
        "zh" | "zh-cn" | "zh-hans" => "chi_sim",
        "zh-tw" | "zh-hant" => "chi_tra",
        "ja" | "jp" | "jpn" => "jpn",
        "ko" | "kor" => "kor",
        "ru" | "rus" => "rus",
        "tr" | "tur" => "tur",
        "fr" | "fra" => "fra",
        "de" | "deu" => "deu",
        "es" | "spa" => "spa",
        "it" | "ita" => "ita",
        "pt" | "por" => "por",
        "pl" | "pol" => "pol",
        _ => "eng",
    }
}

/// Whisper language hint; `None` lets the model auto-detect.
pub fn map_lang_for_whisper(code: &str) -> Option<String> {
    let code = normalize_code(code);
    if code.is_empty() || code == "auto" {
        return None;
    }
    let base = code.split(['-', '_']).next().unwrap_or(&code);
    match base {
        "jp" | "jpn" => Some("ja".to_string()),
        "eng" => Some("en".to_string()),
        "ara" => Some("ar".to_string()),
        value if value.len() == 2 => Some(value.to_string()),
        _ => None,
    }
}

/// Scripts a source language writes in, used to widen OCR sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceScript {
    Arabic,
    Latin,
    Cjk,
    Hangul,
    Cyrillic,
    Unknown,
}

pub fn source_script(code: &str) -> SourceScript {
    match normalize_code(code).split(['-', '_']).next().unwrap_or("") {
        "ar" | "fa" | "ur" => SourceScript::Arabic,
        "ja" | "jp" | "zh" => SourceScript::Cjk,
        "ko" => SourceScript::Hangul,
        "ru" | "uk" | "bg" | "sr" => SourceScript::Cyrillic,
        "en" | "fr" | "de" | "es" | "it" | "pt" | "pl" | "tr" | "nl" | "sv" | "id" | "vi" => {
            SourceScript::Latin
        }
        _ => SourceScript::Unknown,
    }
}

pub fn is_auto(code: &str) -> bool {
    let code = normalize_code(code);
    code.is_empty() || code == "auto"
}

fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

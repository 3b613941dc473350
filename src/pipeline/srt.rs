const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `HH:MM:SS,mmm`; negative times clamp to zero and milliseconds truncate.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let hours = (seconds / 3600.0).floor() as u64;
    let rest = seconds % 3600.0;
    let minutes = (rest / 60.0).floor() as u64;
    let rest = rest % 60.0;
    let whole = rest.trunc();
    let millis = ((rest - whole) * 1000.0) as u64;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, whole as u64, millis)
}

/// SRT text: one 1-based block per cue, each followed by a blank line.
pub fn srt_document<'a>(cues: impl IntoIterator<Item = (f64, f64, &'a str)>) -> String {
    let mut out = String::new();
    for (idx, (start, end, text)) in cues.into_iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            idx + 1,
            format_time(start),
            format_time(end),
            text
        ));
    }
    out
}

/// [`srt_document`] as UTF-8 with a byte-order mark.
pub fn write_srt<'a>(cues: impl IntoIterator<Item = (f64, f64, &'a str)>) -> Vec<u8> {
    let document = srt_document(cues);
    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + document.len());
    bytes.extend_from_slice(UTF8_BOM);
    bytes.extend_from_slice(document.as_bytes());
    bytes
}

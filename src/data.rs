use anyhow::{Context, Result, anyhow};
use image::ImageFormat;
use std::collections::BTreeMap;
use std::path::Path;

/// Original filename → raw bytes. Ordered by name so batch processing and
/// review ids are reproducible for a given input set.
pub type InputFiles = BTreeMap<String, Vec<u8>>;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

pub fn load_inputs(paths: &[impl AsRef<Path>]) -> Result<InputFiles> {
    let mut inputs = InputFiles::new();
    for path in paths {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read data file: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(|value| value.to_string())
            .ok_or_else(|| anyhow!("invalid data file name: {}", path.display()))?;
        if inputs.insert(name.clone(), bytes).is_some() {
            return Err(anyhow!("duplicate input file name: {}", name));
        }
    }
    Ok(inputs)
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

pub fn is_video_name(name: &str) -> bool {
    extension_lower(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video(name: &str, bytes: &[u8]) -> bool {
    is_video_name(name)
        || sniff_mime(bytes)
            .map(|mime| mime.starts_with("video/"))
            .unwrap_or(false)
}

/// Picks the container to re-encode into: the filename's extension first,
/// then whatever the bytes sniff as, then PNG.
pub fn image_format_for(name: &str, bytes: &[u8]) -> ImageFormat {
    if let Some(format) = extension_lower(name).and_then(ImageFormat::from_extension) {
        if is_writable(format) {
            return format;
        }
    }
    if let Some(format) = sniff_mime(bytes).and_then(ImageFormat::from_mime_type) {
        if is_writable(format) {
            return format;
        }
    }
    ImageFormat::Png
}

fn is_writable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::WebP
    )
}

pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or(name)
}

fn extension_lower(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintBackend {
    Fill,
    Command,
    None,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_languages: Option<String>,
    pub ocr_upscale: bool,
    pub cluster_threshold: f32,
    pub mask_margin: i32,
    pub text_color: String,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub rtl_font_path: Option<String>,
    pub rtl_font_family: Option<String>,
    pub translate_provider: String,
    pub translate_endpoint: Option<String>,
    pub translate_api_key: Option<String>,
    pub inpaint_backend: InpaintBackend,
    pub inpaint_command: Vec<String>,
    pub colorize_command: Vec<String>,
    pub colorize_denoise: bool,
    pub colorize_sigma: u32,
    pub whisper_model: Option<String>,
    pub review_state_dir: Option<PathBuf>,
    /// Unsubmitted review snapshots older than this are purged; `0` keeps them.
    pub review_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_languages: None,
            ocr_upscale: true,
            cluster_threshold: 65.0,
            mask_margin: 7,
            text_color: "#000000".to_string(),
            font_path: None,
            font_family: None,
            rtl_font_path: None,
            rtl_font_family: None,
            translate_provider: "google".to_string(),
            translate_endpoint: None,
            translate_api_key: None,
            inpaint_backend: InpaintBackend::Fill,
            inpaint_command: Vec::new(),
            colorize_command: Vec::new(),
            colorize_denoise: true,
            colorize_sigma: 25,
            whisper_model: None,
            review_state_dir: None,
            review_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    cluster: Option<ClusterSettings>,
    render: Option<RenderSettings>,
    translate: Option<TranslateSettings>,
    inpaint: Option<InpaintSettings>,
    colorize: Option<ColorizeSettings>,
    whisper: Option<WhisperSettings>,
    review: Option<ReviewSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    upscale: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterSettings {
    threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    mask_margin: Option<i32>,
    text_color: Option<String>,
    font_path: Option<String>,
    font_family: Option<String>,
    rtl_font_path: Option<String>,
    rtl_font_family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    provider: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InpaintSettings {
    backend: Option<String>,
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorizeSettings {
    command: Option<Vec<String>>,
    denoise: Option<bool>,
    denoise_sigma: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WhisperSettings {
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewSettings {
    state_dir: Option<String>,
    ttl_secs: Option<u64>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse bundled settings")?;
    settings.merge(defaults)?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed)
            .with_context(|| format!("invalid settings: {}", path.display()))
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = Some(languages);
            }
            if let Some(upscale) = ocr.upscale {
                self.ocr_upscale = upscale;
            }
        }
        if let Some(cluster) = incoming.cluster {
            if let Some(threshold) = cluster.threshold {
                if threshold > 0.0 {
                    self.cluster_threshold = threshold;
                }
            }
        }
        if let Some(render) = incoming.render {
            if let Some(margin) = render.mask_margin {
                if margin >= 0 {
                    self.mask_margin = margin;
                }
            }
            if let Some(color) = non_empty(render.text_color) {
                self.text_color = color;
            }
            if let Some(path) = non_empty(render.font_path) {
                self.font_path = Some(path);
            }
            if let Some(family) = non_empty(render.font_family) {
                self.font_family = Some(family);
            }
            if let Some(path) = non_empty(render.rtl_font_path) {
                self.rtl_font_path = Some(path);
            }
            if let Some(family) = non_empty(render.rtl_font_family) {
                self.rtl_font_family = Some(family);
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(provider) = non_empty(translate.provider) {
                self.translate_provider = provider.to_lowercase();
            }
            if let Some(endpoint) = non_empty(translate.endpoint) {
                self.translate_endpoint = Some(endpoint);
            }
            if let Some(key) = non_empty(translate.api_key) {
                self.translate_api_key = Some(key);
            }
        }
        if let Some(inpaint) = incoming.inpaint {
            if let Some(backend) = non_empty(inpaint.backend) {
                self.inpaint_backend = parse_inpaint_backend(&backend)?;
            }
            if let Some(command) = inpaint.command {
                if !command.is_empty() {
                    self.inpaint_command = command;
                }
            }
        }
        if let Some(colorize) = incoming.colorize {
            if let Some(command) = colorize.command {
                if !command.is_empty() {
                    self.colorize_command = command;
                }
            }
            if let Some(denoise) = colorize.denoise {
                self.colorize_denoise = denoise;
            }
            if let Some(sigma) = colorize.denoise_sigma {
                self.colorize_sigma = sigma;
            }
        }
        if let Some(whisper) = incoming.whisper {
            if let Some(model) = non_empty(whisper.model) {
                self.whisper_model = Some(model);
            }
        }
        if let Some(review) = incoming.review {
            if let Some(dir) = review.state_dir.as_deref().and_then(paths::normalize_dir) {
                self.review_state_dir = Some(dir);
            }
            if let Some(ttl) = review.ttl_secs {
                self.review_ttl_secs = ttl;
            }
        }
        Ok(())
    }

    pub fn review_state_dir(&self) -> PathBuf {
        self.review_state_dir
            .clone()
            .unwrap_or_else(paths::review_state_dir)
    }

    pub fn review_ttl(&self) -> Option<Duration> {
        (self.review_ttl_secs > 0).then(|| Duration::from_secs(self.review_ttl_secs))
    }
}

fn parse_inpaint_backend(value: &str) -> Result<InpaintBackend> {
    match value.trim().to_lowercase().as_str() {
        "fill" => Ok(InpaintBackend::Fill),
        "command" => Ok(InpaintBackend::Command),
        "none" | "off" => Ok(InpaintBackend::None),
        other => Err(anyhow!(
            "unknown inpaint backend '{}' (expected fill, command or none)",
            other
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_parse() {
        let mut settings = Settings::default();
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).unwrap();
        settings.merge(parsed).unwrap();
        assert_eq!(settings.cluster_threshold, 65.0);
        assert_eq!(settings.mask_margin, 7);
        assert_eq!(settings.inpaint_backend, InpaintBackend::Fill);
        assert_eq!(settings.whisper_model.as_deref(), Some("small"));
        assert!(settings.font_path.is_none());
        assert_eq!(settings.review_ttl(), Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn zero_review_ttl_disables_purging() {
        let parsed: SettingsFile = toml::from_str("[review]\nttl_secs = 0\n").unwrap();
        let mut settings = Settings::default();
        settings.merge(parsed).unwrap();
        assert_eq!(settings.review_ttl(), None);
    }

    #[test]
    fn later_files_override_and_empty_values_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.toml");
        fs::write(
            &path,
            r#"
[cluster]
threshold = 80

[render]
text_color = ""
font_family = "Anime Ace"

[inpaint]
backend = "command"
command = ["lama", "{image}", "{mask}", "{output}"]
"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.merge_file(&path).unwrap();
        assert_eq!(settings.cluster_threshold, 80.0);
        assert_eq!(settings.text_color, "#000000");
        assert_eq!(settings.font_family.as_deref(), Some("Anime Ace"));
        assert_eq!(settings.inpaint_backend, InpaintBackend::Command);
        assert_eq!(settings.inpaint_command.len(), 4);
    }

    #[test]
    fn unknown_inpaint_backend_is_rejected() {
        let parsed: SettingsFile = toml::from_str("[inpaint]\nbackend = \"magic\"\n").unwrap();
        let mut settings = Settings::default();
        assert!(settings.merge(parsed).is_err());
    }
}

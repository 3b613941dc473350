use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod bubbles;
pub mod data;
pub mod error;
pub mod languages;
pub mod logging;
pub mod models;
pub mod ocr;
pub mod operation;
mod paths;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod settings;
pub mod store;

pub use error::{ErrorKind, LocalizeResult};
pub use models::ModelContext;
pub use operation::{Localizer, OperationOutcome, OperationRequest, OperationStatus};
pub use pipeline::{Modification, OperationKind, ReviewItem, ReviewState};
pub use store::{FileReviewStore, MemoryReviewStore, ReviewStore, StoredOperation};

#[derive(Debug, Clone)]
pub struct Config {
    pub operation: String,
    pub data: Vec<String>,
    pub source_lang: String,
    pub lang: String,
    pub review: bool,
    pub submit_review: Option<String>,
    pub modifications: Option<String>,
    pub out_dir: Option<String>,
    pub settings_path: Option<String>,
    pub show_ocr_languages: bool,
    pub debug_ocr: bool,
    pub whisper_model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReviewReport<'a> {
    operation_id: &'a str,
    status: OperationStatus,
    review_items: &'a [ReviewItem],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    diagnostics: &'a [String],
}

enum Job {
    Submit(OperationKind),
    Review(String),
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(model) = config.whisper_model.as_deref() {
        settings.whisper_model = Some(model.to_string());
    }

    if config.show_ocr_languages {
        let langs = ocr::list_tesseract_languages()?;
        return Ok(langs.join("\n"));
    }

    // Reject unknown kinds before touching any input or model.
    let job = match config.submit_review.clone() {
        Some(id) => Job::Review(id),
        None => Job::Submit(config.operation.parse()?),
    };

    let mut context = ModelContext::from_settings(&settings)?;
    if config.debug_ocr {
        context = context.with_ocr_debug(ocr::OcrDebugConfig::new(None)?);
    }
    let localizer = Localizer::new(context, open_store(&settings));

    let kind = match job {
        Job::Review(id) => {
            let modifications = read_modifications(config.modifications.as_deref())?;
            let outcome = localizer.submit_review(&id, &modifications);
            return finish(outcome, config.out_dir.as_deref());
        }
        Job::Submit(kind) => kind,
    };

    if config.data.is_empty() {
        return Err(anyhow!("no input files given (use --data)"));
    }
    let inputs = data::load_inputs(&config.data)?;
    let outcome = localizer
        .submit(OperationRequest {
            kind,
            inputs,
            source_lang: config.source_lang,
            target_lang: config.lang,
            review: config.review,
        })
        .await;

    if outcome.status == OperationStatus::ReviewNeeded {
        return format_review(&outcome);
    }
    finish(outcome, config.out_dir.as_deref())
}

/// Review store under the configured dir, with stale snapshots purged.
fn open_store(settings: &settings::Settings) -> FileReviewStore {
    let store = FileReviewStore::new(settings.review_state_dir());
    if let Some(ttl) = settings.review_ttl() {
        if let Err(err) = store.purge_expired(ttl) {
            tracing::warn!(error = %err, "failed to purge expired review states");
        }
    }
    store
}

fn finish(outcome: OperationOutcome, out_dir: Option<&str>) -> Result<String> {
    for diagnostic in &outcome.diagnostics {
        tracing::warn!(operation = %outcome.operation_id, "{}", diagnostic);
    }
    if outcome.status == OperationStatus::Failed {
        return Err(anyhow!(
            "operation {} failed: {}",
            outcome.operation_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        ));
    }
    let dir = out_dir
        .and_then(paths::normalize_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let written = write_outputs(&outcome.outputs, &dir)?;
    Ok(written
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn format_review(outcome: &OperationOutcome) -> Result<String> {
    let report = ReviewReport {
        operation_id: &outcome.operation_id,
        status: outcome.status,
        review_items: &outcome.review_items,
        diagnostics: &outcome.diagnostics,
    };
    serde_json::to_string_pretty(&report).with_context(|| "failed to serialize review items")
}

/// Writes each output under `dir` by its base name.
fn write_outputs(outputs: &data::InputFiles, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    let mut written = Vec::with_capacity(outputs.len());
    for (name, bytes) in outputs {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| anyhow!("invalid output name: {}", name))?;
        let path = dir.join(file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write output: {}", path.display()))?;
        info!(path = %path.display(), "wrote output");
        written.push(path);
    }
    Ok(written)
}

/// Modifications JSON from a file, or stdin for `-`; none means no edits.
fn read_modifications(source: Option<&str>) -> Result<Vec<Modification>> {
    let content = match source {
        None => return Ok(Vec::new()),
        Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "failed to read modifications from stdin")?;
            buffer
        }
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read modifications: {}", path))?,
    };
    parse_modifications(&content)
}

pub fn parse_modifications(content: &str) -> Result<Vec<Modification>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(content).with_context(|| "modifications must be a JSON array of {index, text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn modifications_parse_from_json() {
        let mods = parse_modifications(r#"[{"index": 1, "text": "NEW"}]"#).unwrap();
        assert_eq!(
            mods,
            vec![Modification {
                index: 1,
                text: "NEW".into()
            }]
        );
        assert!(parse_modifications("  ").unwrap().is_empty());
        assert!(parse_modifications(r#"{"index": 1}"#).is_err());
    }

    #[test]
    fn outputs_are_written_by_base_name() {
        let dir = tempdir().unwrap();
        let mut outputs = data::InputFiles::new();
        outputs.insert("page.png".into(), vec![1, 2]);
        outputs.insert("clip.srt".into(), b"1\n".to_vec());
        let written = write_outputs(&outputs, dir.path()).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("clip.srt"), dir.path().join("page.png")]
        );
        assert_eq!(fs::read(dir.path().join("page.png")).unwrap(), vec![1, 2]);
    }

    #[test]
    fn opening_the_store_purges_stale_snapshots() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("abandoned")).unwrap();
        let settings = settings::Settings {
            review_state_dir: Some(dir.path().to_path_buf()),
            ..settings::Settings::default()
        };
        let store = open_store(&settings);
        assert_eq!(store.root(), dir.path());
        assert!(!dir.path().join("abandoned").exists());

        fs::create_dir_all(dir.path().join("kept")).unwrap();
        let settings = settings::Settings {
            review_ttl_secs: 0,
            ..settings
        };
        open_store(&settings);
        assert!(dir.path().join("kept").exists());
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_before_reading_inputs() {
        let config = Config {
            operation: "dubbing".into(),
            data: vec!["/does/not/exist.png".into()],
            source_lang: "auto".into(),
            lang: "en".into(),
            review: false,
            submit_review: None,
            modifications: None,
            out_dir: None,
            settings_path: None,
            show_ocr_languages: false,
            debug_ocr: false,
            whisper_model: None,
        };
        let err = run(config).await.unwrap_err();
        assert!(err.to_string().contains("unsupported operation type 'dubbing'"));
    }

    #[test]
    fn failed_outcome_is_an_error() {
        let outcome = OperationOutcome {
            operation_id: "op".into(),
            status: OperationStatus::Failed,
            outputs: data::InputFiles::new(),
            review_items: Vec::new(),
            diagnostics: Vec::new(),
            error: Some("review state for operation 'op' is missing or expired".into()),
        };
        let err = finish(outcome, None).unwrap_err();
        assert!(err.to_string().contains("missing or expired"));
    }
}

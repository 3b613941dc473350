use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{CaptionSegment, TranscribeFuture, Transcriber, command_exists};
use crate::error::ErrorKind;
use crate::languages::map_lang_for_whisper;
use crate::paths;

const WHISPER_MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";
const DEFAULT_MODEL: &str = "small";

/// Whisper speech-to-text; the ggml model is resolved (and downloaded) on
/// first use.
#[derive(Debug, Clone, Default)]
pub struct WhisperTranscriber {
    model: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(model: Option<String>) -> Self {
        Self { model }
    }

    async fn run(&self, media: &Path, source_lang: &str) -> Result<Vec<CaptionSegment>> {
        if !command_exists("ffmpeg") {
            return Err(anyhow!("subtitle extraction requires ffmpeg"));
        }
        let dir = tempdir().with_context(|| "failed to create temp dir for audio")?;
        let wav_path = dir.path().join("audio.wav");
        info!(media = %media.display(), "extracting audio with ffmpeg");
        run_ffmpeg(&[
            "-y",
            "-i",
            media.to_string_lossy().as_ref(),
            "-vn",
            "-ar",
            "16000",
            "-ac",
            "1",
            wav_path.to_string_lossy().as_ref(),
        ])
        .with_context(|| "failed to extract audio with ffmpeg")?;

        let model = whisper_model_path(self.model.as_deref()).await?;
        let forced_lang = map_lang_for_whisper(source_lang);
        let segments = transcribe_segments(&model, &wav_path, forced_lang.as_deref())?;
        if !segments.is_empty() {
            return Ok(segments);
        }

        info!("no speech detected, retrying with normalization");
        let normalized_path = dir.path().join("audio_norm.wav");
        run_ffmpeg(&[
            "-y",
            "-i",
            wav_path.to_string_lossy().as_ref(),
            "-af",
            "dynaudnorm",
            normalized_path.to_string_lossy().as_ref(),
        ])
        .with_context(|| "failed to normalize audio")?;
        transcribe_segments(&model, &normalized_path, forced_lang.as_deref())
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe<'a>(&'a self, media: &'a Path, source_lang: &'a str) -> TranscribeFuture<'a> {
        Box::pin(async move {
            self.run(media, source_lang)
                .await
                .map_err(|err| ErrorKind::TranscriptionFailure(format!("{:#}", err)))
        })
    }
}

fn transcribe_segments(
    model: &Path,
    wav_path: &Path,
    forced_lang: Option<&str>,
) -> Result<Vec<CaptionSegment>> {
    let audio = read_wav_mono_f32(wav_path)?;
    let model_path = model.to_string_lossy();
    let ctx =
        WhisperContext::new_with_params(model_path.as_ref(), WhisperContextParameters::default())
            .with_context(|| "failed to load whisper model")?;
    let mut state = ctx
        .create_state()
        .with_context(|| "failed to init whisper state")?;
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(num_cpus::get() as i32);
    params.set_translate(false);
    params.set_print_progress(false);
    match forced_lang {
        Some(lang) => params.set_language(Some(lang)),
        None => params.set_detect_language(true),
    }

    state
        .full(params, &audio[..])
        .with_context(|| "whisper transcription failed")?;

    let count = state
        .full_n_segments()
        .with_context(|| "failed to read segments")?;
    let mut segments = Vec::new();
    for idx in 0..count {
        let text = state
            .full_get_segment_text(idx)
            .with_context(|| "failed to read segment text")?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        // Timestamps are in centiseconds.
        let t0 = state
            .full_get_segment_t0(idx)
            .with_context(|| "failed to read segment start")?;
        let t1 = state
            .full_get_segment_t1(idx)
            .with_context(|| "failed to read segment end")?;
        segments.push(CaptionSegment {
            start: t0 as f64 / 100.0,
            end: t1 as f64 / 100.0,
            text: text.to_string(),
        });
    }
    info!(segments = segments.len(), "transcription finished");
    Ok(segments)
}

fn run_ffmpeg(args: &[&str]) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .with_context(|| "failed to run ffmpeg")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffmpeg failed: {}", stderr.trim()));
    }
    Ok(())
}

async fn whisper_model_path(override_model: Option<&str>) -> Result<PathBuf> {
    let env_model = std::env::var("MANGA_LOCALIZER_WHISPER_MODEL").ok();
    let candidates = [override_model, env_model.as_deref()];
    for value in candidates.into_iter().flatten() {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        let path = PathBuf::from(trimmed);
        if path.exists() {
            return Ok(path);
        }
        if let Some(model) = normalize_model_name(trimmed) {
            return ensure_whisper_model(&model).await;
        }
        return Err(anyhow!("unknown whisper model: {}", trimmed));
    }
    ensure_whisper_model(DEFAULT_MODEL).await
}

async fn ensure_whisper_model(model: &str) -> Result<PathBuf> {
    let dest = paths::whisper_dir().join(format!("ggml-{}.bin", model));
    if dest.exists() {
        return Ok(dest);
    }
    let url = format!("{}/ggml-{}.bin", WHISPER_MODEL_BASE_URL, model);
    info!(model, "whisper model not found; downloading");
    download_whisper_model(&url, &dest).await?;
    Ok(dest)
}

fn normalize_model_name(input: &str) -> Option<String> {
    let raw = input.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    let trimmed = raw.strip_prefix("ggml-").unwrap_or(raw.as_str());
    let trimmed = trimmed.strip_suffix(".bin").unwrap_or(trimmed);

    let allowed = [
        "tiny",
        "base",
        "small",
        "medium",
        "large",
        "large-v2",
        "large-v3",
        "tiny.en",
        "base.en",
        "small.en",
        "medium.en",
    ];
    allowed
        .contains(&trimmed)
        .then(|| trimmed.to_string())
}

async fn download_whisper_model(url: &str, dest: &Path) -> Result<()> {
    use futures_util::StreamExt;

    let dir = dest.parent().ok_or_else(|| anyhow!("invalid model path"))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create model dir: {}", dir.display()))?;

    let response = reqwest::get(url)
        .await
        .with_context(|| format!("failed to download whisper model: {}", url))?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "failed to download whisper model: {} (status {})",
            url,
            response.status()
        ));
    }

    let tmp = dest.with_extension("bin.part");
    let mut file = fs::File::create(&tmp)
        .with_context(|| format!("failed to write model: {}", tmp.display()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| "failed to read model bytes")?;
        std::io::Write::write_all(&mut file, &chunk)?;
    }
    fs::rename(&tmp, dest)
        .with_context(|| format!("failed to finalize model: {}", dest.display()))?;
    Ok(())
}

fn read_wav_mono_f32(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open wav: {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(anyhow!("wav has no channels"));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap_or(0.0)).collect(),
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            if spec.bits_per_sample <= 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.unwrap_or(0) as f32 / max)
                    .collect()
            } else {
                reader
                    .samples::<i32>()
                    .map(|s| s.unwrap_or(0) as f32 / max)
                    .collect()
            }
        }
    };

    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect())
}

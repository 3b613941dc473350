use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tracing::{info, warn};

use super::srt::{format_time, write_srt};
use super::{
    Modification, RenderOutput, ReviewItem, ReviewState, ScanOutput, SubtitleSegment,
    modification_map,
};
use crate::data::{self, InputFiles};
use crate::error::{ErrorKind, LocalizeResult};
use crate::models::ModelContext;
use crate::providers::translate_or_keep;

/// Transcribes the first video input and renders translated SRT captions.
#[derive(Debug, Clone, Copy)]
pub struct SubtitleStage;

impl SubtitleStage {
    pub async fn scan(
        &self,
        context: &ModelContext,
        inputs: &InputFiles,
        source_lang: &str,
        target_lang: &str,
    ) -> LocalizeResult<ScanOutput> {
        let (name, bytes) = inputs
            .iter()
            .find(|(name, bytes)| data::is_video(name, bytes))
            .ok_or(ErrorKind::NoVideoInput)?;
        let transcriber = context.transcriber.as_ref().ok_or_else(|| {
            ErrorKind::TranscriptionFailure("no transcriber configured".to_string())
        })?;

        let dir = tempdir().map_err(|err| ErrorKind::TranscriptionFailure(err.to_string()))?;
        let file_name = Path::new(name)
            .file_name()
            .map(|value| value.to_os_string())
            .unwrap_or_else(|| "input.mp4".into());
        let media = dir.path().join(file_name);
        fs::write(&media, bytes).map_err(|err| ErrorKind::TranscriptionFailure(err.to_string()))?;

        info!(video = %name, "transcribing");
        let transcript = transcriber.transcribe(&media, source_lang).await?;

        let mut diagnostics = Vec::new();
        let mut segments = Vec::with_capacity(transcript.len());
        for caption in transcript {
            let original = caption.text.trim().to_string();
            let translated = if original.is_empty() {
                original.clone()
            } else {
                translate_or_keep(
                    context.translator.as_ref(),
                    &original,
                    source_lang,
                    target_lang,
                    &mut diagnostics,
                )
                .await
            };
            segments.push(SubtitleSegment {
                start: caption.start,
                end: caption.end,
                original,
                translated,
            });
        }
        if segments.is_empty() {
            warn!(video = %name, "no speech segments found");
        }

        let review_items = segments
            .iter()
            .enumerate()
            .map(|(id, segment)| review_item(id, segment, Some(name.as_str())))
            .collect();
        Ok(ScanOutput {
            review_items,
            state: ReviewState::Subtitle {
                segments,
                filename: data::file_stem(name).to_string(),
            },
            diagnostics,
        })
    }

    /// `<filename>.srt`, with modifications keyed by segment index.
    pub fn render(
        &self,
        segments: &[SubtitleSegment],
        filename: &str,
        modifications: &[Modification],
    ) -> LocalizeResult<RenderOutput> {
        let overrides = modification_map(modifications);
        let texts = segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| {
                overrides
                    .get(&idx)
                    .map(|text| text.to_string())
                    .unwrap_or_else(|| segment.translated.clone())
            })
            .collect::<Vec<_>>();
        let bytes = write_srt(
            segments
                .iter()
                .zip(&texts)
                .map(|(segment, text)| (segment.start, segment.end, text.as_str())),
        );

        let output_name = format!("{}.srt", filename);
        info!(file = %output_name, cues = segments.len(), "rendered subtitles");
        let mut output = RenderOutput::default();
        output.outputs.insert(output_name.clone(), bytes);
        output.rendered_texts.insert(output_name, texts);
        Ok(output)
    }
}

/// Review item for a caption; the name carries the video and time range.
pub(crate) fn review_item(id: usize, segment: &SubtitleSegment, video: Option<&str>) -> ReviewItem {
    let range = format!("[{} --> {}]", format_time(segment.start), format_time(segment.end));
    ReviewItem {
        id,
        image_name: match video {
            Some(video) => format!("{} {}", video, range),
            None => range,
        },
        original: segment.original.clone(),
        translated: segment.translated.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaptionSegment, TranscribeFuture, Transcriber};
    use crate::ocr::{RawTextBox, RegionDetector};
    use crate::providers::{TextTranslator, TranslateFuture};
    use crate::render::{OverlayFonts, TextRenderer};
    use image::DynamicImage;

    struct NoText;

    impl RegionDetector for NoText {
        fn detect(&self, _: &DynamicImage, _: &str) -> LocalizeResult<Vec<RawTextBox>> {
            Ok(Vec::new())
        }
    }

    struct Bracket;

    impl TextTranslator for Bracket {
        fn translate<'a>(&'a self, text: &'a str, _: &'a str, _: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move { Ok::<_, ErrorKind>(format!("[{}]", text)) })
        }
    }

    struct Script(Vec<CaptionSegment>);

    impl Transcriber for Script {
        fn transcribe<'a>(&'a self, media: &'a Path, _: &'a str) -> TranscribeFuture<'a> {
            let exists = media.exists();
            let segments = self.0.clone();
            Box::pin(async move {
                assert!(exists);
                Ok::<_, ErrorKind>(segments)
            })
        }
    }

    fn caption(start: f64, end: f64, text: &str) -> CaptionSegment {
        CaptionSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn context() -> ModelContext {
        ModelContext::new(
            Box::new(NoText),
            Box::new(Bracket),
            TextRenderer::new(OverlayFonts::empty(), "#000000"),
        )
        .with_transcriber(Script(vec![
            caption(0.0, 1.5, " hola "),
            caption(1.5, 2.0, "  "),
            caption(3725.125, 3727.0, "adiós"),
        ]))
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn scan_translates_non_empty_segments() {
        let mut inputs = InputFiles::new();
        inputs.insert("notes.txt".into(), b"hello".to_vec());
        inputs.insert("clip.mp4".into(), vec![0u8; 16]);
        let scan = block_on(SubtitleStage.scan(&context(), &inputs, "es", "en")).unwrap();

        insta::assert_json_snapshot!(scan.review_items, @r#"
        [
          {
            "id": 0,
            "image_name": "clip.mp4 [00:00:00,000 --> 00:00:01,500]",
            "original": "hola",
            "translated": "[hola]"
          },
          {
            "id": 1,
            "image_name": "clip.mp4 [00:00:01,500 --> 00:00:02,000]",
            "original": "",
            "translated": ""
          },
          {
            "id": 2,
            "image_name": "clip.mp4 [01:02:05,125 --> 01:02:07,000]",
            "original": "adiós",
            "translated": "[adiós]"
          }
        ]
        "#);
        let ReviewState::Subtitle { filename, .. } = &scan.state else {
            panic!("wrong state kind");
        };
        assert_eq!(filename, "clip");
    }

    #[test]
    fn render_applies_modifications_by_segment_index() {
        let mut inputs = InputFiles::new();
        inputs.insert("clip.mp4".into(), vec![0u8; 16]);
        let scan = block_on(SubtitleStage.scan(&context(), &inputs, "es", "en")).unwrap();
        let mods = vec![Modification {
            index: 2,
            text: "Goodbye!".into(),
        }];
        let out = scan.state.render(&context(), &inputs, &mods).unwrap();
        let srt = &out.outputs["clip.srt"];
        assert!(srt.starts_with(b"\xEF\xBB\xBF"));
        insta::assert_snapshot!(String::from_utf8_lossy(&srt[3..]), @r"
        1
        00:00:00,000 --> 00:00:01,500
        [hola]

        2
        00:00:01,500 --> 00:00:02,000


        3
        01:02:05,125 --> 01:02:07,000
        Goodbye!
        ");
    }

    #[test]
    fn missing_video_is_fatal() {
        let mut inputs = InputFiles::new();
        inputs.insert("page.png".into(), vec![0x89, b'P', b'N', b'G']);
        let err = block_on(SubtitleStage.scan(&context(), &inputs, "es", "en")).unwrap_err();
        assert!(matches!(err, ErrorKind::NoVideoInput));
    }
}

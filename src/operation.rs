use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::data::InputFiles;
use crate::error::{ErrorKind, LocalizeResult};
use crate::models::ModelContext;
use crate::pipeline::{Modification, OperationKind, RenderOutput, ReviewItem};
use crate::store::{ReviewStore, StoredOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    ReviewNeeded,
    Success,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::ReviewNeeded => "review_needed",
            OperationStatus::Success => "success",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }

    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, ReviewNeeded) | (Pending, Success) | (Pending, Failed)
                | (ReviewNeeded, Success)
                | (ReviewNeeded, Failed)
        )
    }

    pub fn transition(self, next: OperationStatus) -> LocalizeResult<OperationStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ErrorKind::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub inputs: InputFiles,
    pub source_lang: String,
    pub target_lang: String,
    /// Stop after the scan and keep a snapshot for [`Localizer::submit_review`].
    pub review: bool,
}

/// What a caller gets back from [`Localizer::submit`] or
/// [`Localizer::submit_review`].
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub operation_id: String,
    pub status: OperationStatus,
    #[serde(skip)]
    pub outputs: InputFiles,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review_items: Vec<ReviewItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    fn new(operation_id: String, status: OperationStatus) -> Self {
        Self {
            operation_id,
            status,
            outputs: InputFiles::new(),
            review_items: Vec::new(),
            diagnostics: Vec::new(),
            error: None,
        }
    }

    fn advance(&mut self, next: OperationStatus) -> LocalizeResult<()> {
        self.status = self.status.transition(next)?;
        Ok(())
    }

    fn complete(&mut self, rendered: RenderOutput) -> LocalizeResult<()> {
        self.advance(OperationStatus::Success)?;
        self.outputs = rendered.outputs;
        self.diagnostics.extend(rendered.diagnostics);
        Ok(())
    }

    fn fail(&mut self, err: ErrorKind) {
        error!(operation = %self.operation_id, error = %err, "operation failed");
        // Failing is allowed from every non-terminal state.
        if !self.status.is_terminal() {
            self.status = OperationStatus::Failed;
        }
        self.outputs.clear();
        self.error = Some(err.to_string());
    }
}

/// Runs operations against one model context and one review store.
pub struct Localizer<S: ReviewStore> {
    context: ModelContext,
    store: S,
}

impl<S: ReviewStore> Localizer<S> {
    pub fn new(context: ModelContext, store: S) -> Self {
        Self { context, store }
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Scans, then either renders straight away or parks the snapshot for
    /// review. Failures end up in the outcome, never as an `Err`.
    pub async fn submit(&self, request: OperationRequest) -> OperationOutcome {
        let id = Uuid::new_v4().to_string();
        let mut outcome = OperationOutcome::new(id, OperationStatus::Pending);
        info!(
            operation = %outcome.operation_id,
            kind = %request.kind,
            files = request.inputs.len(),
            review = request.review,
            "operation accepted"
        );
        if let Err(err) = self.run(&request, &mut outcome).await {
            outcome.fail(err);
        }
        outcome
    }

    async fn run(
        &self,
        request: &OperationRequest,
        outcome: &mut OperationOutcome,
    ) -> LocalizeResult<()> {
        let scan = request
            .kind
            .scan(
                &self.context,
                &request.inputs,
                &request.source_lang,
                &request.target_lang,
            )
            .await?;
        outcome.diagnostics.extend(scan.diagnostics);

        if request.review {
            self.store.save(
                &outcome.operation_id,
                &StoredOperation {
                    state: scan.state,
                    inputs: request.inputs.clone(),
                },
            )?;
            outcome.review_items = scan.review_items;
            outcome.advance(OperationStatus::ReviewNeeded)?;
            info!(
                operation = %outcome.operation_id,
                items = outcome.review_items.len(),
                "waiting for review"
            );
            return Ok(());
        }

        let rendered = scan.state.render(&self.context, &request.inputs, &[])?;
        outcome.complete(rendered)?;
        info!(operation = %outcome.operation_id, outputs = outcome.outputs.len(), "operation finished");
        Ok(())
    }

    /// Renders a parked operation with the reviewer's edits. The snapshot is
    /// claimed for the render, so a second submission of the same id fails,
    /// and removed once the render succeeds.
    pub fn submit_review(&self, operation_id: &str, modifications: &[Modification]) -> OperationOutcome {
        let mut outcome = OperationOutcome::new(operation_id.to_string(), OperationStatus::ReviewNeeded);
        info!(operation = operation_id, edits = modifications.len(), "review submitted");
        if let Err(err) = self.run_review(operation_id, modifications, &mut outcome) {
            outcome.fail(err);
        }
        outcome
    }

    fn run_review(
        &self,
        operation_id: &str,
        modifications: &[Modification],
        outcome: &mut OperationOutcome,
    ) -> LocalizeResult<()> {
        let stored = self.store.claim(operation_id)?;
        outcome.review_items = stored.state.review_items();
        let rendered = match stored
            .state
            .render(&self.context, &stored.inputs, modifications)
        {
            Ok(rendered) => rendered,
            Err(err) => {
                // Hand the snapshot back so the review can be resubmitted.
                if let Err(release_err) = self.store.release(operation_id) {
                    warn!(operation = operation_id, error = %release_err, "failed to release review state");
                }
                return Err(err);
            }
        };
        outcome.complete(rendered)?;
        if let Err(err) = self.store.remove(operation_id) {
            warn!(operation = operation_id, error = %err, "failed to remove review state");
            outcome.diagnostics.push(err.to_string());
        }
        info!(operation = operation_id, outputs = outcome.outputs.len(), "review rendered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FillInpainter;
    use crate::ocr::{Point, RawTextBox, RegionDetector};
    use crate::providers::{TextTranslator, TranslateFuture};
    use crate::render::{OverlayFonts, TextRenderer};
    use crate::store::MemoryReviewStore;
    use image::DynamicImage;

    struct TwoWords;

    impl RegionDetector for TwoWords {
        fn detect(&self, _: &DynamicImage, _: &str) -> LocalizeResult<Vec<RawTextBox>> {
            let word = |x: f32, text: &str| RawTextBox {
                polygon: vec![
                    Point::new(x, 20.0),
                    Point::new(x + 30.0, 20.0),
                    Point::new(x + 30.0, 32.0),
                    Point::new(x, 32.0),
                ],
                text: text.to_string(),
                confidence: 1.0,
            };
            Ok(vec![word(10.0, "hola"), word(20.0, "amigo")])
        }
    }

    struct Echo;

    impl TextTranslator for Echo {
        fn translate<'a>(&'a self, text: &'a str, _: &'a str, _: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move { Ok::<_, ErrorKind>(format!("<{}>", text)) })
        }
    }

    fn localizer() -> Localizer<MemoryReviewStore> {
        let context = ModelContext::new(
            Box::new(TwoWords),
            Box::new(Echo),
            TextRenderer::new(OverlayFonts::empty(), "#000000"),
        )
        .with_inpainter(FillInpainter::default());
        Localizer::new(context, MemoryReviewStore::new())
    }

    fn request(kind: OperationKind, review: bool) -> OperationRequest {
        let mut inputs = InputFiles::new();
        let image = image::RgbaImage::from_pixel(80, 60, image::Rgba([0, 0, 0, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        inputs.insert("page.png".into(), png);
        OperationRequest {
            kind,
            inputs,
            source_lang: "es".into(),
            target_lang: "en".into(),
            review,
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        use OperationStatus::*;
        assert!(Pending.can_transition_to(ReviewNeeded));
        assert!(Pending.can_transition_to(Success));
        assert!(ReviewNeeded.can_transition_to(Failed));
        assert!(!ReviewNeeded.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Failed));
        assert!(matches!(
            Failed.transition(Success).unwrap_err(),
            ErrorKind::InvalidTransition { .. }
        ));
    }

    #[test]
    fn direct_submit_succeeds_without_snapshot() {
        let localizer = localizer();
        let outcome = block_on(localizer.submit(request(OperationKind::Translate, false)));
        assert_eq!(outcome.status, OperationStatus::Success);
        assert!(outcome.outputs.contains_key("page.png"));
        assert!(localizer.store().is_empty());
        assert!(Uuid::parse_str(&outcome.operation_id).is_ok());
    }

    #[test]
    fn review_submit_parks_snapshot_until_rendered() {
        let localizer = localizer();
        let outcome = block_on(localizer.submit(request(OperationKind::Translate, true)));
        assert_eq!(outcome.status, OperationStatus::ReviewNeeded);
        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.review_items.len(), 1);
        assert_eq!(outcome.review_items[0].translated, "<hola amigo>");
        assert_eq!(localizer.store().len(), 1);

        let done = localizer.submit_review(&outcome.operation_id, &[]);
        assert_eq!(done.status, OperationStatus::Success);
        assert!(done.outputs.contains_key("page.png"));
        assert!(localizer.store().is_empty());

        let again = localizer.submit_review(&outcome.operation_id, &[]);
        assert_eq!(again.status, OperationStatus::Failed);
        assert!(again.error.unwrap().contains("missing or expired"));
    }

    #[test]
    fn claimed_operation_cannot_be_rendered_twice() {
        let localizer = localizer();
        let parked = block_on(localizer.submit(request(OperationKind::Translate, true)));
        localizer.store().claim(&parked.operation_id).unwrap();

        let outcome = localizer.submit_review(&parked.operation_id, &[]);
        assert_eq!(outcome.status, OperationStatus::Failed);
        assert!(outcome.outputs.is_empty());

        localizer.store().release(&parked.operation_id).unwrap();
        let outcome = localizer.submit_review(&parked.operation_id, &[]);
        assert_eq!(outcome.status, OperationStatus::Success);
    }

    #[test]
    fn subtitle_without_video_fails() {
        let localizer = localizer();
        let outcome = block_on(localizer.submit(request(OperationKind::Subtitle, false)));
        assert_eq!(outcome.status, OperationStatus::Failed);
        assert!(outcome.outputs.is_empty());
        assert_eq!(
            outcome.error.as_deref(),
            Some("no suitable video file found in inputs")
        );
    }

    #[test]
    fn outcome_json_omits_outputs() {
        let localizer = localizer();
        let outcome = block_on(localizer.submit(request(OperationKind::Translate, true)));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "review_needed");
        assert!(value.get("outputs").is_none());
        assert_eq!(value["review_items"][0]["id"], 0);
    }
}

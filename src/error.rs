use thiserror::Error;

/// Failure kinds shared by every adapter and stage.
///
/// Model adapters report recoverable kinds; the orchestration layer decides
/// whether to degrade (see [`ErrorKind::is_recoverable`]) or fail the operation.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("text detection failed: {0}")]
    DetectionFailure(String),

    #[error("translation failed: {0}")]
    TranslationFailure(String),

    #[error("inpainting unavailable: {0}")]
    InpaintingUnavailable(String),

    #[error("colorization failed: {0}")]
    ColorizationFailure(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailure(String),

    #[error("review state for operation '{0}' is missing or expired")]
    ReviewStateMissing(String),

    #[error("review state version {found} is not supported (expected {expected})")]
    IncompatibleReviewState { found: u32, expected: u32 },

    #[error("unsupported operation type '{0}'")]
    UnsupportedOperationType(String),

    #[error("no suitable video file found in inputs")]
    NoVideoInput,

    #[error("invalid image '{name}': {reason}")]
    InvalidImage { name: String, reason: String },

    #[error("failed to encode '{name}': {reason}")]
    Encode { name: String, reason: String },

    #[error("review store error: {0}")]
    Store(String),

    #[error("invalid operation id '{0}'")]
    InvalidOperationId(String),

    #[error("operation cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl ErrorKind {
    /// Adapter failures that degrade a single image instead of the whole batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::DetectionFailure(_)
                | ErrorKind::TranslationFailure(_)
                | ErrorKind::InpaintingUnavailable(_)
                | ErrorKind::ColorizationFailure(_)
                | ErrorKind::InvalidImage { .. }
                | ErrorKind::Encode { .. }
        )
    }
}

pub type LocalizeResult<T> = Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn adapter_failures_are_recoverable() {
        assert!(ErrorKind::DetectionFailure("model".into()).is_recoverable());
        assert!(ErrorKind::TranslationFailure("quota".into()).is_recoverable());
        assert!(ErrorKind::InpaintingUnavailable("missing".into()).is_recoverable());
        assert!(ErrorKind::ColorizationFailure("oom".into()).is_recoverable());
    }

    #[test]
    fn state_failures_are_fatal() {
        assert!(!ErrorKind::ReviewStateMissing("abc".into()).is_recoverable());
        assert!(!ErrorKind::UnsupportedOperationType("dubbing".into()).is_recoverable());
        assert!(!ErrorKind::NoVideoInput.is_recoverable());
        assert!(!ErrorKind::Store("disk full".into()).is_recoverable());
    }
}

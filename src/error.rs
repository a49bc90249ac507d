//! Error types for inference stages and configuration.

use thiserror::Error;

use crate::stage::StageKind;

/// Result type for a single inference call.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Per-call inference failure.
///
/// None of these abort the pipeline: the orchestrator leaves the affected
/// track field stale (or, for the detector, skips association for the frame).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("{0} model is not loaded")]
    ModelNotLoaded(StageKind),

    #[error("input shape mismatch: expected {expected:?}, got {actual:?}")]
    InputShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid stage input: {0}")]
    InvalidInput(String),

    #[error("backend execution failed: {0}")]
    BackendExecutionFailed(String),

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("{stage} stage timed out after {budget_ms} ms")]
    StageTimeout { stage: StageKind, budget_ms: u64 },
}

impl InferenceError {
    /// Create a backend failure error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendExecutionFailed(message.into())
    }

    /// Create a malformed output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }
}

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

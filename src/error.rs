//! Error types for the TrackWise service

use thiserror::Error;

/// Result type alias for TrackWise operations
pub type Result<T> = std::result::Result<T, TrackwiseError>;

#[derive(Error, Debug)]
pub enum TrackwiseError {

    // =============================
    // Domain Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many actions: {count} exceeds the limit of {max}")]
    ActionLimitExceeded { count: usize, max: usize },

    #[error("A question is already being answered for this session")]
    ChatBusy,

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Language Model Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Model returned no usable answer: {0}")]
    ModelDeclined(String),

    #[error("Model output did not match schema for {flow}: {reason}")]
    SchemaMismatch { flow: &'static str, reason: String },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TrackwiseError {
    /// True for failures at the language model boundary.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            TrackwiseError::LlmError(_)
                | TrackwiseError::ModelDeclined(_)
                | TrackwiseError::SchemaMismatch { .. }
                | TrackwiseError::HttpError(_)
        )
    }
}

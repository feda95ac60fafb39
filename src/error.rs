//! Error types for Murmur.

use crate::scheduler::SlotName;
use thiserror::Error;

/// Library-level error type for Murmur operations.
#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Document produced no chunks after normalization")]
    EmptyDocument,

    #[error("No document has been indexed yet")]
    NotIndexed,

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Speech recognition is not ready: {0}")]
    AsrNotReady(String),

    #[error("Vision captioning failed: {0}")]
    VisionFailed(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Accelerator still held by {holder} after {waited_ms} ms")]
    ResourceBusyTimeout { holder: SlotName, waited_ms: u64 },

    #[error("Worker slot {slot} failed: {reason}")]
    SlotFailed { slot: SlotName, reason: String },

    #[error("Worker slot {0} is not loaded")]
    NotLoaded(SlotName),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl MurmurError {
    /// Whether this error came from an inference collaborator (as opposed to
    /// a bad request or a scheduling outcome).
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            MurmurError::EmbeddingFailed(_)
                | MurmurError::GenerationFailed(_)
                | MurmurError::AsrNotReady(_)
                | MurmurError::VisionFailed(_)
                | MurmurError::ClassificationFailed(_)
                | MurmurError::OpenAI(_)
                | MurmurError::Http(_)
        )
    }
}

/// Result type alias for Murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

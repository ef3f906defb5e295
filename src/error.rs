use thiserror::Error;

use crate::generation::GenerationError;
use crate::queue::QueueError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Item not found or not pending: {0}")]
    NotFound(String),

    #[error("Illegal status transition for item {item_id}: {from} -> {to}")]
    IllegalTransition {
        item_id: String,
        from: String,
        to: String,
    },

    #[error("Generation backend error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Queue transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Compliance configuration error: {0}")]
    Configuration(String),

    #[error("Malformed generation output: {0}")]
    MalformedOutput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// `NotFound` is the redelivery guard firing; everything else aborts the item.
    pub fn is_fault(&self) -> bool {
        !matches!(self, PipelineError::NotFound(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

//! Error taxonomy for the counting pipeline.
//!
//! Capability seams (frame sources, detector backends, model loaders) speak
//! `anyhow::Result`. The session boundary maps those failures into
//! `PipelineError` so callers can tell a bad upload from a broken model.

use thiserror::Error;

/// Result type for session-level operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The selected input is not a playable video. The session stays idle.
    #[error("invalid media: {0}")]
    InvalidMedia(String),

    /// The detector could not be initialized. Fatal for the session's loop.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// A single detection pass failed. Recovered locally by the loop.
    #[error("detection failed for tick {tick}: {message}")]
    DetectionTick { tick: u64, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }

    /// Flatten an `anyhow` chain into a model load error.
    pub fn model_load(err: &anyhow::Error) -> Self {
        Self::ModelLoad(format!("{:#}", err))
    }
}

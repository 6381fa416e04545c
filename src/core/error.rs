//! Error types for the post-processing pipeline

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown effect type: {0}")]
    UnknownEffectType(&'static str),

    #[error("Effect name already registered by another type: {0}")]
    DuplicateEffectName(&'static str),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

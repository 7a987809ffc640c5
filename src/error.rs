//! Error types for video-processor.

use crate::llm::BackendError;
use crate::subtitle::SubtitleError;
use thiserror::Error;

/// Library-level error type for video-processor operations.
#[derive(Error, Debug)]
pub enum VpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt template not found: {0}")]
    TemplateNotFound(String),

    #[error("Prompt template '{0}' has no {{{{ transcript }}}} placeholder")]
    TemplateInvalid(String),

    #[error(transparent)]
    Subtitle(#[from] SubtitleError),

    #[error(transparent)]
    Chat(#[from] BackendError),

    #[error("Media source error: {0}")]
    MediaSource(String),

    #[error("Caption download failed: {0}")]
    Captions(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("{0} is not set; {1} needs it. Export it, e.g.:\n  export {0}=your_api_key_here")]
    CredentialMissing(&'static str, &'static str),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for video-processor operations.
pub type Result<T> = std::result::Result<T, VpError>;

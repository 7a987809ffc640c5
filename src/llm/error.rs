//! Chat backend error taxonomy.

use super::Backend;
use serde::Deserialize;
use thiserror::Error;

/// Category of a failed chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Credential rejected by the backend.
    Unauthenticated,
    /// Quota or rate limit exceeded.
    RateLimited,
    /// The requested model does not exist on the backend.
    ModelNotFound,
    /// The backend failed on its side (5xx, overloaded, stream error).
    ServerError,
    /// Transport failure: connection refused, timeout, broken stream.
    NetworkError,
    /// The response did not match any known schema.
    MalformedResponse,
    /// Support for the backend was not compiled into this binary.
    SdkMissing,
    /// The credential needed by the backend is not configured.
    CredentialMissing,
    /// The backend rejected the request itself (4xx other than the above).
    InvalidRequest,
}

/// A failed chat request.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub raw_status: Option<u16>,
    transient: bool,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_status: None,
            transient: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.raw_status = Some(status);
        self
    }

    pub(crate) fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Whether retrying the same request may succeed (5xx, connect, timeout).
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn malformed(backend: Backend, detail: impl std::fmt::Display) -> Self {
        Self::new(
            BackendErrorKind::MalformedResponse,
            format!("Unexpected response format from {}: {}", backend.label(), detail),
        )
    }

    pub fn credential_missing(backend: Backend, env_var: &str) -> Self {
        Self::new(
            BackendErrorKind::CredentialMissing,
            format!(
                "{} is not set; the {} backend needs it. Export it, e.g.:\n  export {}=your_api_key_here",
                env_var,
                backend.label(),
                env_var
            ),
        )
    }

    pub fn sdk_missing(backend: Backend, feature: &str) -> Self {
        Self::new(
            BackendErrorKind::SdkMissing,
            format!(
                "{} support is not compiled into this binary; rebuild with:\n  cargo install video-processor --features {}",
                backend.label(),
                feature
            ),
        )
    }

    /// Map a transport-level `reqwest` failure.
    pub fn from_transport(backend: Backend, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(
                BackendErrorKind::NetworkError,
                format!("Request to {} timed out: {}", backend.label(), err),
            )
            .transient()
        } else if err.is_connect() {
            Self::new(
                BackendErrorKind::NetworkError,
                format!("Could not connect to {}: {}", backend.label(), err),
            )
            .transient()
        } else if err.is_decode() {
            Self::malformed(backend, err)
        } else {
            Self::new(
                BackendErrorKind::NetworkError,
                format!("Request to {} failed: {}", backend.label(), err),
            )
        }
    }

    /// Map a non-success HTTP status and its error detail.
    pub fn from_status(backend: Backend, status: u16, detail: &str, model: &str) -> Self {
        let label = backend.label();
        let err = match status {
            401 | 403 => Self::new(
                BackendErrorKind::Unauthenticated,
                format!("{} rejected the credential (HTTP {}): {}", label, status, detail),
            ),
            429 => Self::new(
                BackendErrorKind::RateLimited,
                format!("{} rate limit or quota exceeded (HTTP 429): {}", label, detail),
            ),
            404 => Self::new(
                BackendErrorKind::ModelNotFound,
                format!("Model '{}' not found on {}: {}", model, label, detail),
            ),
            500..=599 => Self::new(
                BackendErrorKind::ServerError,
                format!("{} server error (HTTP {}): {}", label, status, detail),
            )
            .transient(),
            _ => Self::new(
                BackendErrorKind::InvalidRequest,
                format!("{} rejected the request (HTTP {}): {}", label, status, detail),
            ),
        };
        err.with_status(status)
    }

    /// Server-side failure reported inside an otherwise successful response.
    pub fn server(backend: Backend, detail: impl std::fmt::Display) -> Self {
        Self::new(
            BackendErrorKind::ServerError,
            format!("{} reported an error: {}", backend.label(), detail),
        )
    }

    /// Connection dropped while a response was being read.
    pub fn interrupted(backend: Backend, detail: impl std::fmt::Display) -> Self {
        Self::new(
            BackendErrorKind::NetworkError,
            format!("Connection to {} interrupted: {}", backend.label(), detail),
        )
        .transient()
    }

    /// Note that retries were exhausted.
    pub(crate) fn after_attempts(mut self, attempts: u32) -> Self {
        self.message = format!("{} (gave up after {} attempts)", self.message, attempts);
        self
    }
}

/// Error body shared by the OpenAI, Ollama and Anthropic APIs.
///
/// OpenAI/Ollama: `{"error": {"message": .., "type": .., "code": ..}}`,
/// Anthropic: `{"type": "error", "error": {"type": .., "message": ..}}`,
/// Ollama native: `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
        #[serde(default)]
        code: Option<serde_json::Value>,
    },
    Plain(String),
}

/// Details extracted from an error response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetail {
    /// Provider error type, e.g. `not_found_error`.
    pub kind: Option<String>,
    /// Provider error code, e.g. `model_not_found`.
    pub code: Option<String>,
    pub message: String,
}

impl ErrorDetail {
    /// Parse an error body, falling back to the raw text.
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                error: ErrorField::Detailed { message, kind, code },
            }) => Self {
                kind,
                code: code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                message: message.unwrap_or_default().trim().to_string(),
            },
            Ok(ErrorEnvelope {
                error: ErrorField::Plain(message),
            }) => Self {
                message: message.trim().to_string(),
                ..Self::default()
            },
            Err(_) => Self {
                message: body.trim().to_string(),
                ..Self::default()
            },
        }
    }

    /// Whether the detail describes a missing model.
    pub fn is_model_not_found(&self) -> bool {
        let lower = self.message.to_lowercase();
        self.kind.as_deref() == Some("not_found_error")
            || self.code.as_deref() == Some("model_not_found")
            || (lower.contains("model") && lower.contains("not found"))
    }
}

//! Multi-backend chat client.
//!
//! One entry point, [`ChatClient::send`], in front of three wire protocols:
//!
//! - **Local server**: an OpenAI-compatible `/v1/chat/completions` endpoint
//!   such as Ollama. Reports no truncation signal.
//! - **Anthropic**: streaming Text Completions, falling back to streaming
//!   Messages for models that no longer accept the legacy protocol.
//! - **OpenAI**: the Responses API for models that require it, Chat
//!   Completions for the rest. Transient failures are retried with backoff.
//!
//! Every backend returns either one [`ChatResult`] or one [`BackendError`].
//! `truncated` is taken only from the backend's own stop signal.

#[cfg(feature = "anthropic")]
mod anthropic;
mod error;
mod local;
mod openai;
mod retry;
mod sse;
mod wire;

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicBackend, MESSAGES_API_HINT};
pub use error::{BackendError, BackendErrorKind, ErrorDetail};
pub use local::LocalServerBackend;
pub use openai::{is_reasoning_model, uses_responses_api, OpenAiBackend};
pub use retry::{run_with_retry, RetryPolicy, RetryState, Sleeper, TokioSleeper};
pub use sse::{SseDecoder, SseEvent};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// The language model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Backend {
    /// Local OpenAI-compatible server (Ollama).
    #[default]
    #[serde(rename = "ollama", alias = "local")]
    LocalServer,
    #[serde(rename = "anthropic", alias = "claude")]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Backend {
    /// Human-readable name used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            Backend::LocalServer => "Ollama server",
            Backend::Anthropic => "Anthropic Cloud",
            Backend::OpenAi => "OpenAI",
        }
    }

    /// Environment variable holding the backend's credential, if it needs one.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            Backend::LocalServer => None,
            Backend::Anthropic => Some("ANTHROPIC_API_KEY"),
            Backend::OpenAi => Some("OPENAI_API_KEY"),
        }
    }

    /// Whether the backend reports when output was cut off by the token limit.
    ///
    /// For the local server `truncated` is always false, which does not mean
    /// the output was complete.
    pub fn supports_truncation_signal(&self) -> bool {
        !matches!(self, Backend::LocalServer)
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::LocalServer => "llama3.1",
            Backend::Anthropic => "claude-opus-4-1",
            Backend::OpenAi => "gpt-4o",
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(Backend::LocalServer),
            "anthropic" | "claude" => Ok(Backend::Anthropic),
            "openai" => Ok(Backend::OpenAi),
            _ => Err(format!(
                "Unknown LLM backend: {}. Use ollama, anthropic, or openai.",
                s
            )),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::LocalServer => write!(f, "ollama"),
            Backend::Anthropic => write!(f, "anthropic"),
            Backend::OpenAi => write!(f, "openai"),
        }
    }
}

/// A single summarization request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    prompt: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    backend: Backend,
}

impl ChatRequest {
    /// Validate and build a request.
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_output_tokens: u32,
        backend: Backend,
    ) -> Result<Self, BackendError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(BackendError::new(
                BackendErrorKind::InvalidRequest,
                "Model name must not be empty",
            ));
        }
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(BackendError::new(
                BackendErrorKind::InvalidRequest,
                format!("Temperature must be between 0 and 2, got {}", temperature),
            ));
        }
        if max_output_tokens == 0 {
            return Err(BackendError::new(
                BackendErrorKind::InvalidRequest,
                "max_output_tokens must be positive",
            ));
        }

        Ok(Self {
            prompt: prompt.into(),
            model,
            temperature,
            max_output_tokens,
            backend,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

/// Which budget ran out when a response was truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationCause {
    /// The visible output hit the output token limit.
    OutputTokens,
    /// Hidden reasoning consumed the budget.
    ReasoningTokens,
}

impl std::fmt::Display for TruncationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncationCause::OutputTokens => write!(f, "output token limit reached"),
            TruncationCause::ReasoningTokens => {
                write!(f, "token budget exhausted by reasoning tokens")
            }
        }
    }
}

/// The outcome of a successful chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResult {
    text: String,
    cause: Option<TruncationCause>,
    truncation_signal: bool,
}

impl ChatResult {
    /// A response that stopped naturally.
    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cause: None,
            truncation_signal: true,
        }
    }

    /// A response cut off by the token budget.
    pub fn truncated_by(text: impl Into<String>, cause: TruncationCause) -> Self {
        Self {
            text: text.into(),
            cause: Some(cause),
            truncation_signal: true,
        }
    }

    /// A response from a backend that cannot report truncation.
    pub fn unsignalled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cause: None,
            truncation_signal: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// True iff the backend reported that the token limit stopped generation.
    pub fn truncated(&self) -> bool {
        self.cause.is_some()
    }

    pub fn cause(&self) -> Option<TruncationCause> {
        self.cause
    }

    /// False when `truncated` carries no information for this backend.
    pub fn truncation_signal(&self) -> bool {
        self.truncation_signal
    }
}

/// Read-only configuration shared by all requests.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local server base URL, e.g. `http://localhost:11434`.
    pub local_url: String,
    pub anthropic_api_key: Option<String>,
    /// Anthropic base URL without the `/v1` suffix.
    pub anthropic_base_url: String,
    pub openai_api_key: Option<String>,
    /// OpenAI base URL including `/v1`.
    pub openai_base_url: String,
    pub request_timeout: Duration,
    pub local_retry: RetryPolicy,
    pub anthropic_retry: RetryPolicy,
    pub openai_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_url: "http://localhost:11434".to_string(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            request_timeout: Duration::from_secs(300),
            local_retry: RetryPolicy::none(),
            anthropic_retry: RetryPolicy::none(),
            openai_retry: RetryPolicy::default(),
        }
    }
}

/// A wire protocol implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResult, BackendError>;
}

/// Dispatches requests to the backend they name.
pub struct ChatClient {
    local: LocalServerBackend,
    #[cfg(feature = "anthropic")]
    anthropic: AnthropicBackend,
    openai: OpenAiBackend,
}

impl ChatClient {
    /// Create a client that sleeps on the tokio timer between retries.
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, BackendError> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Create a client with a custom backoff sleeper.
    pub fn with_sleeper(
        config: Arc<ClientConfig>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                BackendError::new(
                    BackendErrorKind::NetworkError,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            local: LocalServerBackend::new(http.clone(), config.clone(), sleeper.clone()),
            #[cfg(feature = "anthropic")]
            anthropic: AnthropicBackend::new(http.clone(), config.clone(), sleeper.clone()),
            openai: OpenAiBackend::new(http, config, sleeper),
        })
    }

    /// Send a request to its backend and wait for the full response.
    #[instrument(skip(self, request), fields(backend = %request.backend(), model = %request.model()))]
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResult, BackendError> {
        let result = match request.backend() {
            Backend::LocalServer => self.local.send(request).await,
            #[cfg(feature = "anthropic")]
            Backend::Anthropic => self.anthropic.send(request).await,
            #[cfg(not(feature = "anthropic"))]
            Backend::Anthropic => Err(BackendError::sdk_missing(Backend::Anthropic, "anthropic")),
            Backend::OpenAi => self.openai.send(request).await,
        }?;

        match result.cause() {
            Some(cause) => warn!("Response truncated: {}", cause),
            None => info!("Received {} chars", result.text().len()),
        }
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod log_capture {
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log lines written while it is the default subscriber.
    #[derive(Debug, Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish()
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}

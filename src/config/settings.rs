//! Configuration settings for video-processor.
//!
//! Settings are layered: built-in defaults, then the first config file found,
//! then environment variables. Command-line flags are applied last by the CLI.

use crate::error::{Result, VpError};
use crate::llm::{Backend, ClientConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default port of a local Ollama server.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub transcription: TranscriptionSettings,
    pub llm: LlmSettings,
    pub prompts: PromptSettings,
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Transcription model.
    pub model: String,
    /// Optional language hint (ISO-639-1).
    pub language: Option<String>,
    /// Duration in seconds for splitting long audio files.
    pub chunk_duration_seconds: u32,
    /// Maximum concurrent chunk uploads.
    pub max_concurrent_chunks: usize,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            chunk_duration_seconds: 600,
            max_concurrent_chunks: 2,
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Backend used for summarization.
    pub backend: Backend,
    /// Model name. Falls back to a per-backend default when unset.
    pub model: Option<String>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Local server address, `HOST[:PORT]` or a full URL.
    pub ollama_url: String,
    /// Anthropic API key (usually supplied through `ANTHROPIC_API_KEY`).
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    /// OpenAI API key (usually supplied through `OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: Backend::LocalServer,
            model: None,
            temperature: 0.0,
            max_output_tokens: 2000,
            ollama_url: format!("localhost:{}", DEFAULT_OLLAMA_PORT),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 300,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry policies per backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub local: RetryPolicySettings,
    pub anthropic: RetryPolicySettings,
    pub openai: RetryPolicySettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            local: RetryPolicySettings::single_attempt(),
            anthropic: RetryPolicySettings::single_attempt(),
            openai: RetryPolicySettings::default(),
        }
    }
}

/// Serializable form of [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Add up to one second of random jitter to each delay.
    pub jitter: bool,
}

impl RetryPolicySettings {
    fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl From<&RetryPolicySettings> for RetryPolicy {
    fn from(settings: &RetryPolicySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            jitter: settings.jitter,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompt templates (overrides built-ins by name).
    pub custom_dir: Option<String>,
    /// Name of the summarization template.
    pub template: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            custom_dir: None,
            template: "transcribe.tpl".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the first config file found, then apply environment overrides.
    ///
    /// Search order: `explicit`, `./config.toml`, the user config directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(VpError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_file(path)?
            }
            None => match Self::candidate_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load_file(&path)?,
                None => Settings::default(),
            },
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a single TOML config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Apply environment overrides using the supplied lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = get("LLM_BACKEND") {
            self.llm.backend = backend.parse().map_err(VpError::Config)?;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = get("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key);
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            self.llm.anthropic_base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.openai_base_url = url;
        }
        if let Some(model) = get("WHISPER_MODEL") {
            self.transcription.model = model;
        }
        Ok(())
    }

    /// Config files considered when no explicit path is given.
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![Self::local_config_path(), Self::default_config_path()]
    }

    /// Project-local configuration file.
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("video-processor")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Model for the configured backend, or that backend's default.
    pub fn model(&self) -> String {
        self.llm
            .model
            .clone()
            .unwrap_or_else(|| self.llm.backend.default_model().to_string())
    }

    /// Build the read-only client configuration shared by all chat requests.
    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            local_url: normalize_local_url(&self.llm.ollama_url)?,
            anthropic_api_key: self.llm.anthropic_api_key.clone(),
            anthropic_base_url: trim_base(&self.llm.anthropic_base_url),
            openai_api_key: self.llm.openai_api_key.clone(),
            openai_base_url: trim_base(&self.llm.openai_base_url),
            request_timeout: Duration::from_secs(self.llm.request_timeout_secs),
            local_retry: (&self.llm.retry.local).into(),
            anthropic_retry: (&self.llm.retry.anthropic).into(),
            openai_retry: (&self.llm.retry.openai).into(),
        })
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Normalize a local server address into a base URL.
///
/// A missing scheme defaults to `http://`, and then a missing port to 11434.
/// Bracketed IPv6 hosts are accepted. The trailing slash is dropped.
pub fn normalize_local_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(VpError::Config("Local server address is empty".to_string()));
    }

    let has_scheme = raw.contains("://");
    let with_scheme = if has_scheme {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let invalid = |reason: String| VpError::Config(format!("Invalid local server URL {:?}: {}", raw, reason));
    let mut parsed = url::Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("no host".to_string()));
    }

    if !has_scheme && !has_explicit_port(&with_scheme) {
        parsed
            .set_port(Some(DEFAULT_OLLAMA_PORT))
            .map_err(|_| invalid("cannot set port".to_string()))?;
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Whether the authority of `url` spells out a port, even the scheme default.
fn has_explicit_port(url: &str) -> bool {
    let authority = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
}

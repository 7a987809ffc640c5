//! Configuration module for video-processor.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{render, Prompts, DEFAULT_TEMPLATE, TRANSCRIPT_PLACEHOLDER};
pub use settings::{
    normalize_local_url, LlmSettings, PromptSettings, RetryPolicySettings, RetrySettings,
    Settings, TranscriptionSettings, DEFAULT_OLLAMA_PORT,
};

/// Template written by `--init-config`.
pub const CONFIG_TEMPLATE: &str = include_str!("../../templates/config_template.toml");

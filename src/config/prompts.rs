//! Prompt templates for video-processor.
//!
//! Templates are plain text with a single `{{ transcript }}` placeholder.
//! Built-in templates are compiled in; files with the same name in the custom
//! prompts directory take precedence.

use super::Settings;
use crate::error::{Result, VpError};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Placeholder replaced by the normalized transcript.
pub const TRANSCRIPT_PLACEHOLDER: &str = "{{ transcript }}";

/// Name of the default summarization template.
pub const DEFAULT_TEMPLATE: &str = "transcribe.tpl";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[(
    DEFAULT_TEMPLATE,
    include_str!("../../prompts/transcribe.tpl"),
)];

/// Collection of available prompt templates.
#[derive(Debug, Clone)]
pub struct Prompts {
    templates: HashMap<String, String>,
    custom_dir: Option<PathBuf>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            templates: BUILTIN_TEMPLATES
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
            custom_dir: None,
        }
    }
}

impl Prompts {
    /// Load built-in prompts, with an optional directory of overrides.
    pub fn load(custom_dir: Option<&str>) -> Result<Self> {
        let mut prompts = Prompts::default();
        if let Some(dir) = custom_dir {
            let path = Settings::expand_path(dir);
            if !path.is_dir() {
                return Err(VpError::Config(format!(
                    "Custom prompt directory not found: {}",
                    path.display()
                )));
            }
            prompts.custom_dir = Some(path);
        }
        Ok(prompts)
    }

    /// Look up a template by name.
    pub fn template(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.custom_dir {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!("Using custom template {}", candidate.display());
                return Ok(std::fs::read_to_string(candidate)?);
            }
        }

        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| VpError::TemplateNotFound(name.to_string()))
    }

    /// Build the prompt for `name`, substituting the transcript.
    pub fn build(&self, name: &str, transcript: &str) -> Result<String> {
        let template = self.template(name)?;
        render(name, &template, transcript)
    }
}

/// Replace the placeholder in `template` with `transcript`, once.
pub fn render(name: &str, template: &str, transcript: &str) -> Result<String> {
    if !template.contains(TRANSCRIPT_PLACEHOLDER) {
        return Err(VpError::TemplateInvalid(name.to_string()));
    }
    Ok(template.replacen(TRANSCRIPT_PLACEHOLDER, transcript, 1))
}

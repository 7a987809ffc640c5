//! Summarization pipeline.
//!
//! Coordinates the run from source to Markdown: captions or speech-to-text,
//! timestamped transcript, prompt, chat backend.

use crate::config::{Prompts, Settings};
use crate::error::{Result, VpError};
use crate::llm::{ChatClient, ChatRequest, ChatResult};
use crate::media::{human_size, MediaSource};
use crate::naming::{slugify, summary_filename, RunStamp};
use crate::subtitle::srt_to_timestamped_lines;
use crate::transcription::{KeepArtifacts, SpeechToText};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Where the summary goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    /// File named after the source title.
    Auto,
    File(PathBuf),
}

impl OutputTarget {
    /// `None` prints to stdout; an empty value or `=` derives the name.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            None => OutputTarget::Stdout,
            Some("") | Some("=") => OutputTarget::Auto,
            Some(path) => OutputTarget::File(PathBuf::from(path)),
        }
    }
}

/// Write the summary, reporting whether an existing file was replaced.
pub fn write_summary(path: &Path, markdown: &str) -> Result<bool> {
    let existed = path.exists();
    std::fs::write(path, markdown)?;
    Ok(existed)
}

/// Transcript obtained for a source.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub srt: String,
    /// Human-readable note on where it came from.
    pub origin: String,
}

/// Everything one run needs, assembled once.
pub struct Summarizer {
    settings: Settings,
    prompts: Prompts,
    client: ChatClient,
    speech: SpeechToText,
    stamp: RunStamp,
    debug: bool,
}

impl Summarizer {
    pub fn new(settings: Settings, stamp: RunStamp, debug: bool) -> Result<Self> {
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
        let client = ChatClient::new(Arc::new(settings.client_config()?))?;
        let speech = SpeechToText::new(&settings);

        Ok(Self {
            settings,
            prompts,
            client,
            speech,
            stamp,
            debug,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// `_<backend>_<model>_<stamp>` for this run's debug artifacts.
    pub fn artifact_suffix(&self) -> String {
        self.stamp
            .timestamp_suffix(&self.settings.llm.backend.to_string(), &self.settings.model())
    }

    fn artifact_path(&self, title: &str, extension: &str) -> PathBuf {
        let slug = slugify(title);
        let stem = if slug.is_empty() { "transcript" } else { slug.as_str() };
        PathBuf::from(format!("{}{}.{}", stem, self.artifact_suffix(), extension))
    }

    /// Obtain the SRT transcript for `source`.
    #[instrument(skip_all)]
    pub async fn transcript(&self, source: &MediaSource) -> Result<Transcript> {
        match source {
            MediaSource::YouTube(video) => {
                let captions = video.download_captions().await?;
                if self.debug {
                    let path = self.artifact_path(&video.title_or_id().await, "srt");
                    std::fs::write(&path, &captions.srt)?;
                    info!("Saved SRT file to {}", path.display());
                }
                Ok(Transcript {
                    origin: format!(
                        "Received {}subtitles ({})",
                        if captions.automatic { "auto-generated " } else { "" },
                        human_size(captions.size_bytes)
                    ),
                    srt: captions.srt,
                })
            }
            MediaSource::Local(media) => {
                let keep = self.debug.then(|| KeepArtifacts {
                    audio: self.artifact_path(&media.stem(), "mp3"),
                    srt: self.artifact_path(&media.stem(), "srt"),
                });
                let srt = self
                    .speech
                    .transcribe_to_srt(media.path(), keep.as_ref())
                    .await?;
                Ok(Transcript {
                    origin: format!("Transcribed with {}", self.speech.model()),
                    srt,
                })
            }
        }
    }

    /// Fill the configured template with the timestamped transcript.
    pub fn build_prompt(&self, srt: &str) -> Result<String> {
        let lines = srt_to_timestamped_lines(srt)?;
        if lines.is_empty() {
            return Err(VpError::Transcription(
                "Transcript is empty; nothing to summarize".to_string(),
            ));
        }
        self.prompts.build(&self.settings.prompts.template, &lines)
    }

    pub fn request(&self, prompt: String) -> Result<ChatRequest> {
        let llm = &self.settings.llm;
        Ok(ChatRequest::new(
            prompt,
            self.settings.model(),
            llm.temperature,
            llm.max_output_tokens,
            llm.backend,
        )?)
    }

    /// Summarize an SRT transcript.
    pub async fn summarize(&self, srt: &str) -> Result<ChatResult> {
        let request = self.request(self.build_prompt(srt)?)?;
        info!(
            "Sending {} chars to {} ({})",
            request.prompt().len(),
            request.backend(),
            request.model()
        );
        Ok(self.client.send(&request).await?)
    }

    /// Resolve the output file for `target`, asking the source for a title if needed.
    pub async fn output_path(&self, target: &OutputTarget, source: &MediaSource) -> Option<PathBuf> {
        match target {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) => Some(path.clone()),
            OutputTarget::Auto => Some(PathBuf::from(summary_filename(&source.title().await))),
        }
    }
}

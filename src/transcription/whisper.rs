//! Speech-to-text through the OpenAI transcription API.

use super::{segments_to_cues, Segment};
use crate::config::Settings;
use crate::error::{Result, VpError};
use crate::media::{extract_audio, split_audio};
use crate::subtitle::compose_srt;
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Where to keep intermediate files when debugging.
#[derive(Debug, Clone)]
pub struct KeepArtifacts {
    /// Copy of the extracted audio.
    pub audio: PathBuf,
    /// Composed SRT document.
    pub srt: PathBuf,
}

/// Remote model used for local Whisper size names.
pub const REMOTE_WHISPER_MODEL: &str = "whisper-1";

/// Sizes of the open-source Whisper checkpoints, with or without `.en`.
const WHISPER_SIZES: &[&str] = &[
    "tiny", "base", "small", "medium", "large", "large-v1", "large-v2", "large-v3",
    "large-v3-turbo", "turbo",
];

/// Map a Whisper checkpoint size (`base`, `small.en`, ...) to the remote model.
///
/// Other names are passed through, so custom endpoints can serve their own models.
pub fn resolve_model(name: &str) -> String {
    let name = name.trim();
    let size = name.strip_suffix(".en").unwrap_or(name);
    if WHISPER_SIZES.contains(&size.to_lowercase().as_str()) {
        info!(
            "Whisper size '{}' runs remotely; using {}",
            name, REMOTE_WHISPER_MODEL
        );
        return REMOTE_WHISPER_MODEL.to_string();
    }
    name.to_string()
}

/// Transcribes media files into SRT documents.
///
/// The API client is created on first use and reused afterwards.
pub struct SpeechToText {
    model: String,
    language: Option<String>,
    chunk_seconds: u32,
    max_concurrent: usize,
    api_key: Option<String>,
    api_base: String,
    timeout: Duration,
    client: OnceCell<Client<OpenAIConfig>>,
}

impl SpeechToText {
    pub fn new(settings: &Settings) -> Self {
        Self {
            model: resolve_model(&settings.transcription.model),
            language: settings.transcription.language.clone(),
            chunk_seconds: settings.transcription.chunk_duration_seconds,
            max_concurrent: settings.transcription.max_concurrent_chunks.max(1),
            api_key: settings.llm.openai_api_key.clone(),
            api_base: settings.llm.openai_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.llm.request_timeout_secs),
            client: OnceCell::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(VpError::CredentialMissing("OPENAI_API_KEY", "speech-to-text"))
    }

    async fn client(&self) -> Result<&Client<OpenAIConfig>> {
        self.client
            .get_or_try_init(|| async {
                let api_key = self.api_key()?;

                let http = reqwest::Client::builder().timeout(self.timeout).build()?;
                let config = OpenAIConfig::new()
                    .with_api_key(api_key)
                    .with_api_base(&self.api_base);
                debug!("Created transcription client for {}", self.api_base);
                Ok::<_, VpError>(Client::with_config(config).with_http_client(http))
            })
            .await
    }

    /// Transcribe an audio or video file and return the SRT document.
    #[instrument(skip(self, keep), fields(model = %self.model, input = %input.display()))]
    pub async fn transcribe_to_srt(
        &self,
        input: &Path,
        keep: Option<&KeepArtifacts>,
    ) -> Result<String> {
        self.api_key()?;
        let work_dir = tempfile::Builder::new().prefix("vp-audio-").tempdir()?;
        let audio = work_dir.path().join("audio.mp3");

        extract_audio(input, &audio).await?;
        if let Some(keep) = keep {
            std::fs::copy(&audio, &keep.audio)?;
            info!("Saved intermediate audio to {}", keep.audio.display());
        }

        let segments = self.transcribe_audio(&audio, work_dir.path()).await?;
        let srt = compose_srt(&segments_to_cues(segments));

        if let Some(keep) = keep {
            std::fs::write(&keep.srt, &srt)?;
            info!("Saved intermediate SRT to {}", keep.srt.display());
        }
        Ok(srt)
    }

    async fn transcribe_audio(&self, audio: &Path, work_dir: &Path) -> Result<Vec<Segment>> {
        let chunks = split_audio(audio, &work_dir.join("chunks"), self.chunk_seconds).await?;
        let chunk_count = chunks.len();
        info!("Transcribing {} audio chunk(s) with {}", chunk_count, self.model);

        let pb = ProgressBar::new(chunk_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} Transcribing [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        let mut results: Vec<(usize, Duration, Vec<Segment>)> = Vec::with_capacity(chunk_count);
        let mut pending = stream::iter(chunks.into_iter().enumerate())
            .map(|(idx, (path, offset))| async move {
                let result = self.transcribe_chunk(&path).await;
                (idx, offset, result)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((idx, offset, result)) = pending.next().await {
            pb.inc(1);
            match result {
                Ok(segments) => results.push((idx, offset, segments)),
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(VpError::Transcription(format!(
                        "Chunk {} at {:.0}s failed: {}",
                        idx,
                        offset.as_secs_f64(),
                        e
                    )));
                }
            }
        }
        pb.finish_and_clear();

        results.sort_by_key(|(idx, _, _)| *idx);
        Ok(results
            .into_iter()
            .flat_map(|(_, offset, segments)| {
                segments.into_iter().map(move |s| s.shifted(offset))
            })
            .collect())
    }

    async fn transcribe_chunk(&self, path: &Path) -> Result<Vec<Segment>> {
        let client = self.client().await?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mut builder = CreateTranscriptionRequestArgs::default();
        builder
            .file(AudioInput::from_vec_u8(file_name, bytes))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);
        if let Some(language) = &self.language {
            builder.language(language);
        }
        let request = builder
            .build()
            .map_err(|e| VpError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| VpError::Transcription(format!("Transcription API error: {}", e)))?;

        let segments = match response.segments {
            Some(segments) => segments
                .iter()
                .map(|s| Segment::new(f64::from(s.start), f64::from(s.end), s.text.trim()))
                .collect(),
            None => vec![Segment::new(
                0.0,
                f64::from(response.duration),
                response.text.trim(),
            )],
        };
        debug!("Chunk {} yielded {} segments", path.display(), segments.len());
        Ok(segments)
    }
}

//! Summarize command: source in, Markdown out.

use crate::cli::preflight::{self, install_hint, Operation};
use crate::cli::{Cli, Output};
use crate::config::{normalize_local_url, Settings};
use crate::error::{Result, VpError};
use crate::llm::{Backend, BackendErrorKind};
use crate::media::MediaSource;
use crate::naming::RunStamp;
use crate::pipeline::{write_summary, OutputTarget, Summarizer};
use std::process::ExitCode;

/// Exit status of a run whose summary was cut off by the token limit.
pub const TRUNCATED_EXIT_CODE: u8 = 2;

/// Apply one-off command-line overrides on top of file and environment settings.
pub fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<()> {
    if let Some(backend) = cli.backend_override().map_err(VpError::Config)? {
        settings.llm.backend = backend;
    }
    if let Some(model) = &cli.llm_model {
        settings.llm.model = Some(model.clone());
    }
    if let Some(temperature) = cli.temperature {
        settings.llm.temperature = temperature;
    }
    if let Some(max_tokens) = cli.max_tokens {
        settings.llm.max_output_tokens = max_tokens;
    }
    if let Some(model) = &cli.whisper_model {
        settings.transcription.model = model.clone();
    }
    if let Some(host) = &cli.ollama_host {
        settings.llm.ollama_url = normalize_local_url(host)?;
        Output::info(&format!("Overriding Ollama URL to {}", settings.llm.ollama_url));
    }
    Ok(())
}

/// Run the summarize command.
///
/// Failures inside the pipeline are reported here, with remediation, and turn
/// into a failing exit code rather than an error for the caller to print again.
pub async fn run_summarize(cli: &Cli, mut settings: Settings, stamp: RunStamp) -> anyhow::Result<ExitCode> {
    let Some(input) = cli.source.as_deref() else {
        anyhow::bail!("Missing argument 'SOURCE'");
    };

    apply_overrides(&mut settings, cli)?;
    let backend = settings.llm.backend;
    let local_url = settings.llm.ollama_url.clone();

    match summarize(cli, input, settings, stamp).await {
        Ok(code) => Ok(code),
        Err(e) => {
            report(&e, backend, &local_url);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn summarize(cli: &Cli, input: &str, settings: Settings, stamp: RunStamp) -> Result<ExitCode> {
    preflight::check(if cli.youtube {
        Operation::Captions
    } else {
        Operation::Transcribe
    })?;

    let source = MediaSource::from_input(input, cli.youtube, cli.debug)?;
    let summarizer = Summarizer::new(settings, stamp, cli.debug)?;

    match &source {
        MediaSource::YouTube(video) => {
            Output::info(&format!("Seeking subtitles for {}", video.url()));
            if cli.download_video {
                Output::info(&format!("Downloading full video for {}", video.url()));
                video.download_video(&std::env::current_dir()?).await?;
            }
        }
        MediaSource::Local(media) => {
            Output::info(&format!("Transcribing {}", media.path().display()));
        }
    }

    let spinner = Output::spinner("Fetching transcript...");
    let transcript = summarizer.transcript(&source).await;
    spinner.finish_and_clear();
    let transcript = transcript?;
    Output::info(&transcript.origin);

    let llm = &summarizer.settings().llm;
    Output::info(&format!(
        "Sending prompt to LLM backend ({}), model={}, temp={}",
        llm.backend,
        summarizer.settings().model(),
        llm.temperature
    ));
    let spinner = Output::spinner("Waiting for the summary...");
    let result = summarizer.summarize(&transcript.srt).await;
    spinner.finish_and_clear();
    let result = result?;
    Output::info(&format!(
        "Received result from LLM (length={} chars)",
        result.text().chars().count()
    ));

    if !result.truncation_signal() {
        Output::warning(&format!(
            "The {} backend does not report truncation; the summary may be incomplete without notice.",
            llm.backend.label()
        ));
    }

    let target = OutputTarget::from_arg(cli.output.as_deref());
    match summarizer.output_path(&target, &source).await {
        None => Output::markdown(result.text()),
        Some(path) => {
            if write_summary(&path, result.text())? {
                Output::success(&format!("Summarization overwritten to {}", path.display()));
            } else {
                Output::success(&format!("Summarization written to {}", path.display()));
            }
        }
    }

    if let Some(cause) = result.cause() {
        Output::error(&format!(
            "The summary is truncated ({}). Raise --max-tokens or use a shorter transcript.",
            cause
        ));
        return Ok(ExitCode::from(TRUNCATED_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

/// Print the error with a remediation hint where one is known.
fn report(err: &VpError, backend: Backend, local_url: &str) {
    Output::error(&err.to_string());
    match err {
        VpError::ToolNotFound(tool) => Output::hint(install_hint(tool)),
        VpError::CredentialMissing(_, "speech-to-text") => Output::hint(
            "Local files are transcribed through the OpenAI API; use --youtube for captioned videos.",
        ),
        VpError::Chat(chat) => match chat.kind {
            BackendErrorKind::NetworkError if backend == Backend::LocalServer => {
                Output::hint(&format!("Is the Ollama server running at {}?", local_url))
            }
            BackendErrorKind::NetworkError
            | BackendErrorKind::ServerError
            | BackendErrorKind::MalformedResponse
            | BackendErrorKind::InvalidRequest => Output::hint(
                "Ensure your LLM backend is configured correctly \
                 (check LLM_BACKEND, OLLAMA_URL, ANTHROPIC_API_KEY, OPENAI_API_KEY).",
            ),
            BackendErrorKind::RateLimited => {
                Output::hint("Wait a moment and retry, or check your plan's quota.")
            }
            _ => {}
        },
        _ => {}
    }
}

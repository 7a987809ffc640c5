//! CLI module for video-processor.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::llm::Backend;
use clap::Parser;

/// Transcribe and summarize a video/audio SOURCE (file path or YouTube URL) in Markdown.
#[derive(Parser, Debug)]
#[command(name = "video-processor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Video/audio file, or a YouTube URL with --youtube
    #[arg(value_name = "SOURCE", required_unless_present_any = ["init_config", "symlink_cli"])]
    pub source: Option<String>,

    /// Treat SOURCE as a YouTube URL and download captions via yt-dlp
    #[arg(short = 'y', long)]
    pub youtube: bool,

    /// Also download the full YouTube video via yt-dlp
    #[arg(short = 'd', long, requires = "youtube")]
    pub download_video: bool,

    /// Show debug output and keep intermediate audio/SRT files
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Speech-to-text model for local files
    #[arg(short = 'w', long)]
    pub whisper_model: Option<String>,

    /// LLM model used for summarization
    #[arg(short = 'l', long)]
    pub llm_model: Option<String>,

    /// Temperature for the chat completion (0.0 - 2.0)
    #[arg(short = 't', long)]
    pub temperature: Option<f32>,

    /// Output token budget for the summary
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// One-off override for the LLM backend
    #[arg(short = 'b', long, value_parser = ["ollama", "local", "anthropic", "claude", "openai"])]
    pub backend: Option<String>,

    /// One-off override for the Ollama server
    #[arg(long, value_name = "HOST[:PORT]")]
    pub ollama_host: Option<String>,

    /// Copy the config template to ./config.toml, link it into the user config directory, and exit
    #[arg(long)]
    pub init_config: bool,

    /// Symlink this executable into ~/bin and exit
    #[arg(long)]
    pub symlink_cli: bool,

    /// Write the summary to FILE; use -o= to name it after the video title
    #[arg(short = 'o', long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    pub output: Option<String>,

    /// Path to configuration file
    #[arg(short = 'c', long)]
    pub config: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Backend chosen on the command line, if any.
    pub fn backend_override(&self) -> Result<Option<Backend>, String> {
        self.backend.as_deref().map(str::parse).transpose()
    }

    /// Log filter level from `-v` count; `--debug` implies at least debug.
    pub fn log_level(&self) -> &'static str {
        match (self.verbose, self.debug) {
            (0, false) => "warn",
            (1, false) => "info",
            (0..=2, _) => "debug",
            _ => "trace",
        }
    }
}

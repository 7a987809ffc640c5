//! video-processor - Markdown summaries of videos and recordings
//!
//! Turns a local audio/video file or a YouTube video into a Markdown summary:
//! a transcript is obtained (speech-to-text or downloaded captions), rewritten
//! as `[HH:MM:SS] text` lines, placed into a prompt template and sent to a
//! language model.
//!
//! # Architecture
//!
//! - `subtitle` - SRT parsing and the timestamped transcript format
//! - `config` - Settings layering and prompt templates
//! - `llm` - Chat client for a local Ollama server, Anthropic and OpenAI
//! - `media` - YouTube captions and local audio via yt-dlp/ffmpeg
//! - `transcription` - Speech-to-text for local media
//! - `naming` - Slugs and run timestamps for output files
//! - `pipeline` - Coordinates one run
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use video_processor::llm::{Backend, ChatClient, ChatRequest, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::new(Arc::new(ClientConfig::default()))?;
//!     let request = ChatRequest::new("Summarize: ...", "llama3.1", 0.0, 2000, Backend::LocalServer)?;
//!
//!     let result = client.send(&request).await?;
//!     println!("{}", result.text());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod naming;
pub mod pipeline;
pub mod subtitle;
pub mod transcription;

pub use error::{Result, VpError};

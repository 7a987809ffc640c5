//! Media sources for transcripts.
//!
//! A source is either a YouTube URL, whose captions are downloaded with
//! yt-dlp, or a local audio/video file, whose audio is extracted with ffmpeg
//! and sent to speech-to-text.

mod audio;
mod local;
mod youtube;

pub use audio::{extract_audio, probe_duration, split_audio};
pub use local::LocalMedia;
pub use youtube::{extract_video_id, Captions, YoutubeSource};

use crate::error::{Result, VpError};
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Where the transcript comes from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    YouTube(YoutubeSource),
    Local(LocalMedia),
}

impl MediaSource {
    /// Interpret `input` as a YouTube URL when `youtube` is set, else as a file path.
    pub fn from_input(input: &str, youtube: bool, debug: bool) -> Result<Self> {
        if youtube {
            Ok(MediaSource::YouTube(YoutubeSource::new(input, debug)?))
        } else {
            Ok(MediaSource::Local(LocalMedia::new(PathBuf::from(input))?))
        }
    }

    /// Human title used to derive output filenames.
    ///
    /// For YouTube this asks yt-dlp; failures fall back to the video id.
    pub async fn title(&self) -> String {
        match self {
            MediaSource::YouTube(source) => source.title_or_id().await,
            MediaSource::Local(media) => media.title(),
        }
    }
}

/// Run an external tool, mapping a missing binary to `ToolNotFound`.
pub(crate) async fn run_tool(tool: &str, command: &mut Command) -> Result<Output> {
    debug!("Running {:?}", command.as_std());
    command.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VpError::ToolNotFound(tool.to_string())
        } else {
            VpError::ToolFailed(format!("{} could not be started: {}", tool, e))
        }
    })
}

/// Turn a non-zero exit status into `ToolFailed` with the tool's stderr.
pub(crate) fn ensure_success(tool: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(VpError::ToolFailed(format!(
        "{} exited with {}: {}",
        tool,
        output.status,
        stderr.trim()
    )))
}

/// Format a byte count with binary units, e.g. `12.50KiB`.
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KiB", "MiB", "GiB"] {
        if value < 1024.0 {
            return format!("{:.2}{}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2}TiB", value)
}

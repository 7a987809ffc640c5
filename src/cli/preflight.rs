//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools are available before starting a run that
//! would otherwise fail midway.

use crate::error::{Result, VpError};
use std::process::Command;

/// What the run is about to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Download YouTube captions or videos.
    Captions,
    /// Extract and transcribe local audio.
    Transcribe,
}

impl Operation {
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Operation::Captions => &["yt-dlp"],
            Operation::Transcribe => &["ffmpeg", "ffprobe"],
        }
    }
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation) -> Result<()> {
    for tool in operation.required_tools() {
        check_tool(tool)?;
    }
    Ok(())
}

/// How to install a missing tool.
pub fn install_hint(tool: &str) -> &'static str {
    match tool {
        "yt-dlp" => "Install it with `pip install yt-dlp` or your package manager.",
        "ffmpeg" | "ffprobe" => {
            "Install ffmpeg (e.g. `brew install ffmpeg` or `apt install ffmpeg`); it ships ffprobe."
        }
        _ => "Install it and make sure it is on your PATH.",
    }
}

fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(VpError::ToolFailed(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VpError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(VpError::ToolFailed(format!("{}: {}", name, e))),
    }
}

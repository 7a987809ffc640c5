//! Audio extraction and splitting with ffmpeg/ffprobe.

use super::{ensure_success, run_tool};
use crate::error::{Result, VpError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Extract the audio track of `source` as mono 16 kHz MP3.
#[instrument(skip_all, fields(source = %source.display()))]
pub async fn extract_audio(source: &Path, dest: &Path) -> Result<()> {
    let output = run_tool(
        FFMPEG,
        Command::new(FFMPEG)
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-vn", "-ac", "1", "-ar", "16000"])
            .args(["-codec:a", "libmp3lame", "-qscale:a", "4"])
            .args(["-loglevel", "error"])
            .arg(dest),
    )
    .await?;
    ensure_success(FFMPEG, &output)?;

    if !dest.exists() {
        return Err(VpError::ToolFailed(format!(
            "ffmpeg produced no audio for {}",
            source.display()
        )));
    }
    debug!("Extracted audio to {}", dest.display());
    Ok(())
}

/// Split `source` into pieces of at most `chunk_seconds`.
///
/// Returns each piece with its offset from the start. Audio no longer than
/// one chunk is returned as is.
#[instrument(skip_all)]
pub async fn split_audio(
    source: &Path,
    output_dir: &Path,
    chunk_seconds: u32,
) -> Result<Vec<(PathBuf, Duration)>> {
    std::fs::create_dir_all(output_dir)?;

    let total = probe_duration(source).await?;
    info!("Total audio duration: {:.1}s", total);

    let chunk_len = f64::from(chunk_seconds.max(1));
    if total <= chunk_len {
        return Ok(vec![(source.to_path_buf(), Duration::ZERO)]);
    }

    let base_name = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");

    let mut segments = Vec::new();
    let mut offset = 0.0;
    let mut idx = 0u32;

    while offset < total {
        let segment_path = output_dir.join(format!("{}_{:04}.mp3", base_name, idx));
        let segment_len = chunk_len.min(total - offset);

        extract_segment(source, &segment_path, offset, segment_len).await?;

        debug!("Created segment {} at offset {:.1}s", idx, offset);
        segments.push((segment_path, Duration::from_secs_f64(offset)));

        offset += chunk_len;
        idx += 1;
    }

    info!("Created {} audio segments", segments.len());
    Ok(segments)
}

async fn extract_segment(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    let copy = run_tool(
        FFMPEG,
        Command::new(FFMPEG)
            .arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", length))
            .args(["-c", "copy", "-y", "-loglevel", "warning"])
            .arg(dest),
    )
    .await?;

    if copy.status.success() && dest.exists() {
        return Ok(());
    }

    warn!("Stream copy failed, re-encoding segment");
    let encode = run_tool(
        FFMPEG,
        Command::new(FFMPEG)
            .arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", length))
            .args(["-codec:a", "libmp3lame", "-qscale:a", "4", "-y"])
            .args(["-loglevel", "error"])
            .arg(dest),
    )
    .await?;
    ensure_success(FFMPEG, &encode)
}

/// Duration of a media file in seconds.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = run_tool(
        FFPROBE,
        Command::new(FFPROBE)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path),
    )
    .await?;
    ensure_success(FFPROBE, &output)?;
    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(json: &str) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| VpError::ToolFailed(format!("Invalid ffprobe output: {}", e)))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| VpError::ToolFailed("Could not determine audio duration".to_string()))
}

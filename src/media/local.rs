//! Local audio and video files.

use crate::error::{Result, VpError};
use std::path::{Path, PathBuf};
use tracing::warn;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "opus", "m4a", "wma", "aiff", "alac",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpeg", "mpg", "3gp",
];

/// A media file on disk.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    path: PathBuf,
}

impl LocalMedia {
    pub fn new(path: PathBuf) -> Result<Self> {
        if !path.is_file() {
            return Err(VpError::MediaSource(format!(
                "File not found: {}",
                path.display()
            )));
        }
        if !Self::is_media_file(&path) {
            // ffmpeg decides in the end; unknown extensions are only suspicious.
            warn!("{} does not look like an audio or video file", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem, used as the title.
    pub fn title(&self) -> String {
        self.stem()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("media")
            .to_string()
    }

    fn has_extension(path: &Path, known: &[&str]) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| known.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_audio_file(path: &Path) -> bool {
        Self::has_extension(path, AUDIO_EXTENSIONS)
    }

    pub fn is_video_file(path: &Path) -> bool {
        Self::has_extension(path, VIDEO_EXTENSIONS)
    }

    pub fn is_media_file(path: &Path) -> bool {
        Self::is_audio_file(path) || Self::is_video_file(path)
    }
}

//! YouTube captions, titles and video downloads via yt-dlp.

use super::{ensure_success, run_tool};
use crate::error::{Result, VpError};
use crate::naming::slugify;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const YT_DLP: &str = "yt-dlp";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/|youtube\.com/v/)
            ([a-zA-Z0-9_-]{11})
        )
        (?:[^a-zA-Z0-9_-]|$)
    ",
    )
    .expect("Invalid regex")
});

/// Extract the 11-character video id from a YouTube URL.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = VIDEO_ID.captures(input.trim())?;
    caps.get(1).map(|m| m.as_str().to_string())
}

/// Downloaded subtitles.
#[derive(Debug, Clone)]
pub struct Captions {
    /// SRT document.
    pub srt: String,
    /// Size of the downloaded file in bytes.
    pub size_bytes: u64,
    /// Whether the auto-generated track was used.
    pub automatic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptionTrack {
    Creator,
    Automatic,
}

impl CaptionTrack {
    fn flag(&self) -> &'static str {
        match self {
            CaptionTrack::Creator => "--write-sub",
            CaptionTrack::Automatic => "--write-auto-sub",
        }
    }
}

fn caption_args(track: CaptionTrack, template: &str, url: &str) -> Vec<String> {
    [
        "-q",
        "--no-warnings",
        track.flag(),
        "--skip-download",
        "--sub-lang",
        "en",
        "--convert-subs",
        "srt",
        "-o",
        template,
        url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// First `.srt` file in `dir`, if any.
fn find_srt(dir: &Path) -> Result<Option<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"))
        })
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

/// A YouTube video given by URL.
#[derive(Debug, Clone)]
pub struct YoutubeSource {
    url: String,
    video_id: Option<String>,
    debug: bool,
}

impl YoutubeSource {
    pub fn new(url: &str, debug: bool) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(VpError::InvalidInput("YouTube URL is empty".to_string()));
        }
        Ok(Self {
            url: url.to_string(),
            video_id: extract_video_id(url),
            debug,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Video title as reported by yt-dlp.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn title(&self) -> Result<String> {
        let output = run_tool(
            YT_DLP,
            Command::new(YT_DLP).args(["--get-title", "-q", &self.url]),
        )
        .await?;
        ensure_success(YT_DLP, &output)?;

        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Err(VpError::MediaSource(format!(
                "yt-dlp returned no title for {}",
                self.url
            )));
        }
        Ok(title)
    }

    /// Title, or the video id when the title cannot be fetched.
    pub async fn title_or_id(&self) -> String {
        match self.title().await {
            Ok(title) => title,
            Err(e) => {
                warn!("Could not fetch title: {}", e);
                self.video_id
                    .clone()
                    .unwrap_or_else(|| self.url.rsplit('/').next().unwrap_or("video").to_string())
            }
        }
    }

    /// Download English captions, preferring the creator's track over the
    /// auto-generated one.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn download_captions(&self) -> Result<Captions> {
        let dir = tempfile::Builder::new().prefix("vpdl-").tempdir()?;
        let template = dir.path().join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();

        self.fetch_track(CaptionTrack::Creator, &template).await?;
        let mut automatic = false;
        let mut srt_path = find_srt(dir.path())?;

        if srt_path.is_none() {
            info!("No creator subtitles, trying auto-generated captions");
            self.fetch_track(CaptionTrack::Automatic, &template).await?;
            automatic = true;
            srt_path = find_srt(dir.path())?;
        }

        let path = srt_path.ok_or_else(|| {
            VpError::Captions(format!(
                "yt-dlp did not produce any .srt file for {}",
                self.url
            ))
        })?;
        debug!("Reading subtitles from {}", path.display());

        let size_bytes = std::fs::metadata(&path)?.len();
        let srt = std::fs::read_to_string(&path)?;
        Ok(Captions {
            srt,
            size_bytes,
            automatic,
        })
    }

    async fn fetch_track(&self, track: CaptionTrack, template: &str) -> Result<()> {
        let args = caption_args(track, template, &self.url);
        let output = run_tool(YT_DLP, Command::new(YT_DLP).args(&args)).await?;
        ensure_success(YT_DLP, &output).map_err(|e| VpError::Captions(e.to_string()))
    }

    /// Download the full video into `dir`, named after the slugged title.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn download_video(&self, dir: &Path) -> Result<()> {
        let name = match self.title().await {
            Ok(title) if !slugify(&title).is_empty() => format!("{}.%(ext)s", slugify(&title)),
            _ => "%(id)s.%(ext)s".to_string(),
        };
        let template = dir.join(name);

        let mut command = Command::new(YT_DLP);
        if !self.debug {
            command.args(["-q", "--no-warnings"]);
        }
        command.arg("-o").arg(&template).arg(&self.url);

        let output = run_tool(YT_DLP, &mut command).await?;
        ensure_success(YT_DLP, &output)
            .map_err(|e| VpError::MediaSource(format!("Error downloading video: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "youtube.com/shorts/dQw4w9WgXcQ?si=abc",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{}", url);
        }
        assert_eq!(extract_video_id("not-a-video"), None);
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQextra"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_caption_args() {
        let args = caption_args(CaptionTrack::Automatic, "/tmp/x/%(id)s.%(ext)s", "URL");
        assert!(args.contains(&"--write-auto-sub".to_string()));
        assert!(!args.contains(&"--write-sub".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("URL"));

        let args = caption_args(CaptionTrack::Creator, "t", "URL");
        let lang = args.iter().position(|a| a == "--sub-lang").unwrap();
        assert_eq!(args[lang + 1], "en");
        assert!(args.contains(&"--skip-download".to_string()));
    }

    #[test]
    fn test_find_srt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_srt(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join("abc.en.vtt"), "WEBVTT").unwrap();
        std::fs::write(dir.path().join("abc.en.SRT"), "1").unwrap();
        let found = find_srt(dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "abc.en.SRT");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(YoutubeSource::new("  ", false).is_err());
        let source = YoutubeSource::new("https://youtu.be/dQw4w9WgXcQ", false).unwrap();
        assert_eq!(source.video_id(), Some("dQw4w9WgXcQ"));
    }
}

//! Subtitle handling.
//!
//! Parses SubRip (SRT) documents into cues and normalizes them into the
//! `[HH:MM:SS] text` line format consumed by the summarization prompt.

mod srt;

pub use srt::{compose_srt, parse_srt};

use std::time::Duration;
use thiserror::Error;

/// Errors produced while reading subtitle documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtitleError {
    /// A cue block could not be parsed. `cue` is the 1-based block position.
    #[error("Malformed subtitle cue #{cue}: {reason}")]
    Parse { cue: usize, reason: String },
}

/// A single timed subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Sequence number as written in the document.
    pub index: u64,
    /// Start offset from the beginning of the media.
    pub start: Duration,
    /// End offset from the beginning of the media.
    pub end: Duration,
    /// Cue text, possibly spanning several lines.
    pub text: String,
}

impl Cue {
    pub fn new(index: u64, start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Cue text with embedded line breaks collapsed to single spaces.
    pub fn single_line_text(&self) -> String {
        self.text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Convert an SRT document into one `[HH:MM:SS] text` line per cue.
///
/// The hour field is not capped, so recordings longer than a day keep
/// counting upwards. Fails without partial output if any cue is malformed.
pub fn srt_to_timestamped_lines(srt: &str) -> Result<String, SubtitleError> {
    let cues = parse_srt(srt)?;
    Ok(cues
        .iter()
        .map(|cue| format!("[{}] {}", format_clock(cue.start), cue.single_line_text()))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Format a duration as `HH:MM:SS`, truncating fractional seconds.
pub fn format_clock(offset: Duration) -> String {
    let total = offset.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

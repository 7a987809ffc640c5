//! SubRip (SRT) parsing and composition.

use super::{Cue, SubtitleError};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// `HH:MM:SS,mmm --> HH:MM:SS,mmm`, optionally followed by position hints.
static TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d+):(\d{1,2}):(\d{1,2})[,.](\d{1,3})\s*-->\s*(\d+):(\d{1,2}):(\d{1,2})[,.](\d{1,3})(?:\s.*)?$",
    )
    .expect("Invalid regex")
});

/// Parse an SRT document into cues, in document order.
pub fn parse_srt(document: &str) -> Result<Vec<Cue>, SubtitleError> {
    let document = document.strip_prefix('\u{feff}').unwrap_or(document);
    let normalized = document.replace("\r\n", "\n").replace('\r', "\n");

    let mut cues = Vec::new();
    for (i, block) in blocks(&normalized).into_iter().enumerate() {
        cues.push(parse_block(i + 1, &block)?);
    }
    Ok(cues)
}

/// Group lines into blank-line separated blocks.
fn blocks(document: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in document.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_block(position: usize, lines: &[&str]) -> Result<Cue, SubtitleError> {
    let fail = |reason: String| SubtitleError::Parse {
        cue: position,
        reason,
    };

    let index_line = lines.first().map(|l| l.trim()).unwrap_or_default();
    let index = index_line
        .parse::<u64>()
        .map_err(|_| fail(format!("expected sequence number, found {:?}", index_line)))?;

    let timing_line = lines
        .get(1)
        .ok_or_else(|| fail("missing timing line".to_string()))?;
    let caps = TIMING
        .captures(timing_line)
        .ok_or_else(|| fail(format!("invalid timing line {:?}", timing_line)))?;

    let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
    let start = timestamp(field(1), field(2), field(3), field(4))
        .ok_or_else(|| fail(format!("invalid start time in {:?}", timing_line)))?;
    let end = timestamp(field(5), field(6), field(7), field(8))
        .ok_or_else(|| fail(format!("invalid end time in {:?}", timing_line)))?;

    if end < start {
        return Err(fail("end time precedes start time".to_string()));
    }

    let text = lines[2..].join("\n");
    Ok(Cue::new(index, start, end, text))
}

fn timestamp(hours: &str, minutes: &str, seconds: &str, fraction: &str) -> Option<Duration> {
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    // "5" means 500ms, "05" means 50ms
    let millis: u64 = format!("{:0<3}", fraction).parse().ok()?;

    let total_secs = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
    Some(Duration::from_secs(total_secs) + Duration::from_millis(millis))
}

/// Compose cues into an SRT document, renumbering from 1.
pub fn compose_srt(cues: &[Cue]) -> String {
    let mut output = String::new();

    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end)
        ));
        output.push_str(cue.text.trim());
        output.push_str("\n\n");
    }

    output
}

/// Format timestamp for SRT (00:00:00,000).
fn format_srt_timestamp(offset: Duration) -> String {
    let total_ms = offset.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

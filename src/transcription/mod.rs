//! Speech-to-text for local media.
//!
//! Audio is extracted with ffmpeg, split into chunks, transcribed through the
//! OpenAI transcription API and reassembled into one SRT document.

mod whisper;

pub use whisper::{resolve_model, KeepArtifacts, SpeechToText, REMOTE_WHISPER_MODEL};

use crate::subtitle::Cue;
use std::time::Duration;

/// A transcribed span, in seconds from the start of its audio.
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    start: f64,
    end: f64,
    text: String,
}

impl Segment {
    fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn shifted(mut self, offset: Duration) -> Self {
        self.start += offset.as_secs_f64();
        self.end += offset.as_secs_f64();
        self
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Number the non-empty segments as SRT cues.
fn segments_to_cues(segments: Vec<Segment>) -> Vec<Cue> {
    segments
        .into_iter()
        .filter(|s| !s.text.is_empty())
        .enumerate()
        .map(|(i, s)| {
            let start = seconds(s.start);
            let end = seconds(s.end).max(start);
            Cue::new(i as u64 + 1, start, end, s.text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::{compose_srt, srt_to_timestamped_lines};

    #[test]
    fn test_segments_become_numbered_cues() {
        let cues = segments_to_cues(vec![
            Segment::new(0.0, 2.5, "Hello"),
            Segment::new(2.5, 3.0, ""),
            Segment::new(3.0, 4.25, "world"),
        ]);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].index, 2);
        assert_eq!(cues[1].start, Duration::from_secs(3));
        assert_eq!(cues[1].end, Duration::from_millis(4250));
    }

    #[test]
    fn test_offset_and_timestamped_output() {
        let segment = Segment::new(1.0, 2.0, "later").shifted(Duration::from_secs(600));
        let srt = compose_srt(&segments_to_cues(vec![segment]));
        assert_eq!(srt_to_timestamped_lines(&srt).unwrap(), "[00:10:01] later");
    }

    #[test]
    fn test_inverted_times_are_clamped() {
        let cues = segments_to_cues(vec![Segment::new(5.0, 4.0, "x"), Segment::new(-1.0, 1.0, "y")]);
        assert_eq!(cues[0].end, cues[0].start);
        assert_eq!(cues[1].start, Duration::ZERO);
    }
}

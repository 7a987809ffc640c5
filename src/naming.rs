//! File naming for summaries and debug artifacts.

use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("Invalid regex"));
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_-]+").expect("Invalid regex"));

const STAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Turn a title into a filename-safe slug without spaces.
///
/// ```
/// use video_processor::naming::slugify;
/// assert_eq!(slugify("Rust: The Good Parts!"), "Rust-The-Good-Parts");
/// ```
pub fn slugify(title: &str) -> String {
    let stripped = NON_WORD.replace_all(title, "");
    SEPARATORS
        .replace_all(stripped.trim(), "-")
        .into_owned()
}

/// Markdown filename derived from a title.
pub fn summary_filename(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        "summary.md".to_string()
    } else {
        format!("{}.md", slug)
    }
}

/// Timestamp fixed at the start of a run and shared by every artifact it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    pub fn at(time: DateTime<Local>) -> Self {
        Self(time.format(STAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `_<backend>_<model>_<stamp>`, appended to debug artifact names.
    pub fn timestamp_suffix(&self, backend: &str, model: &str) -> String {
        format!("_{}_{}_{}", backend, slugify(model), self.0)
    }
}

impl std::fmt::Display for RunStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

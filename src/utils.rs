//! Text helpers shared by the scrapers, the prompts and the logs.
//!
//! - Truncation with a marker, to bound prompt size
//! - Whitespace normalization for extracted page text
//! - Short previews of long strings for log lines

use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static REPEATED_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

/// Cut `text` to at most `max_chars` characters, appending `marker` when cut.
///
/// Lengths are counted in characters, not bytes, so the cut never lands
/// inside a multi-byte sequence. Text that already fits is returned as is.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_with_marker("abcdef", 3, "…"), "abc…");
/// assert_eq!(truncate_with_marker("abc", 3, "…"), "abc");
/// ```
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}

/// Collapse runs of blank lines into a single blank line and runs of spaces
/// into a single space.
pub fn normalize_whitespace(text: &str) -> String {
    let text = BLANK_LINES.replace_all(text, "\n\n");
    REPEATED_SPACES.replace_all(&text, " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
        None => s.to_string(),
    }
}

//! Prompt construction and parsing of the model's selection reply.

use crate::models::Story;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{instrument, warn};

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Instructions used when the prompt-context file is missing.
pub const DEFAULT_PROMPT_CONTEXT: &str = include_str!("../prompts/newsletter_prompt_context.md");

/// Load the selection instructions from `path`, falling back to the bundled
/// copy when the file cannot be read.
#[instrument(level = "info")]
pub fn load_prompt_context(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(context) => context,
        Err(e) => {
            warn!(%path, error = %e, "Prompt context not readable; using bundled default");
            DEFAULT_PROMPT_CONTEXT.to_string()
        }
    }
}

/// Number every story from 1, one block per story.
pub fn format_story_list(stories: &[Story]) -> String {
    let mut out = String::new();
    for (i, story) in stories.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   Article: {}\n   Comments: {}\n\n",
            i + 1,
            story.title,
            story.article_url,
            story.comments_url
        ));
    }
    out
}

/// Build the prompt asking the model which stories match `keywords`.
pub fn build_selection_prompt(context: &str, stories: &[Story], keywords: &[String]) -> String {
    format!(
        "{context}\n\nTITLES TO ANALYZE:\n{titles}\n\nKEYWORDS: {keywords}\n",
        titles = format_story_list(stories),
        keywords = keywords.iter().join(", "),
    )
}

/// Build the prompt asking for a summary of one story and its discussion.
pub fn build_summary_prompt(
    title: &str,
    article_text: &str,
    comments_text: &str,
    keywords: &[String],
) -> String {
    format!(
        "Please provide a concise summary of this article and highlight key discussion points from the comments.

ARTICLE TITLE: {title}

ARTICLE CONTENT:
{article_text}

HACKER NEWS COMMENTS:
{comments_text}

Please provide:
1. A brief summary (2-3 sentences) of the article's main points
2. Key insights or interesting perspectives from the comments
3. Why this might be relevant to someone interested in {keywords}",
        keywords = keywords.iter().join(", "),
    )
}

/// Extract every run of ASCII digits from the model's reply, in order.
///
/// Duplicates are kept and nothing is range-checked here; runs too large for
/// a `usize` are dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_selection("\"3\", \"17\" and 2"), vec![3, 17, 2]);
/// ```
pub fn parse_selection(response: &str) -> Vec<usize> {
    NUMBER
        .find_iter(response)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

//! Data models for stories, their summaries, and the rendered newsletter.
//!
//! Everything here lives only for the duration of one run:
//! - [`Story`]: one entry of the listing page
//! - [`ArticleSummary`]: a story the model picked, together with its summary
//! - [`NewsletterView`]: the named variables handed to the email template

use serde::Serialize;

/// A listing entry as scraped from the front page.
///
/// Stories are produced in document order and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    /// The headline text of the title link.
    pub title: String,
    /// Absolute URL of the linked article.
    pub article_url: String,
    /// Absolute URL of the discussion thread.
    pub comments_url: String,
}

/// A story selected by the model, with the summary it produced.
///
/// `index` is the 1-based position of the story in the listing, exactly as
/// the model referred to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub index: usize,
    pub title: String,
    pub article_url: String,
    pub comments_url: String,
    /// Summary text. Markdown when produced by the model, HTML once prepared
    /// for the template.
    pub summary: String,
}

impl ArticleSummary {
    /// Build a summary record for `story` at 1-based position `index`.
    pub fn new(index: usize, story: &Story, summary: String) -> Self {
        Self {
            index,
            title: story.title.clone(),
            article_url: story.article_url.clone(),
            comments_url: story.comments_url.clone(),
            summary,
        }
    }
}

/// The fixed set of variables consumed by the email template.
#[derive(Debug, Serialize)]
pub struct NewsletterView<'a> {
    pub newsletter_title: String,
    pub date: String,
    pub keywords: &'a [String],
    pub total_articles: usize,
    pub selected_count: usize,
    pub articles: Vec<ArticleSummary>,
}

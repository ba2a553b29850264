//! Page scrapers for the listing, the linked articles and the discussions.
//!
//! Each scraper is split in two:
//!
//! 1. **Fetching**: a GET with the shared browser-like client. Failures are
//!    logged and degrade to an empty result; nothing here returns an error
//!    to the pipeline.
//! 2. **Parsing**: a pure function over the HTML string, so the extraction
//!    rules are testable without a network.
//!
//! | Module | Fetches | Produces |
//! |--------|---------|----------|
//! | [`hackernews`] | listing page, item page | `Vec<Story>`, comment text |
//! | [`article`] | any article page | main-content text |

pub mod article;
pub mod hackernews;

use crate::config::ScrapingSettings;
use crate::models::Story;
use crate::utils::truncate_with_marker;
use reqwest::Client;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

/// Build the HTTP client used for every page fetch.
pub fn build_client(settings: &ScrapingSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout())
        .build()
}

/// GET `url` and return the body, failing on any non-success status.
#[instrument(level = "debug", skip(client))]
pub async fn fetch_html(client: &Client, url: &str) -> Result<String, Box<dyn Error>> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.text().await?;
    debug!(bytes = body.len(), "Fetched page");
    Ok(body)
}

/// Article and discussion text for one story, already bounded for a prompt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoryContent {
    pub article_text: String,
    pub comments_text: String,
}

impl StoryContent {
    pub fn is_empty(&self) -> bool {
        self.article_text.is_empty() && self.comments_text.is_empty()
    }
}

/// Fetch the article and discussion for `story`.
///
/// Both halves are fetched independently: if one fails the other is still
/// returned, and the failed half is an empty string. Each text is truncated
/// to its configured maximum with the truncation marker appended.
#[instrument(level = "info", skip_all, fields(title = %story.title))]
pub async fn fetch_story_content(
    client: &Client,
    story: &Story,
    settings: &ScrapingSettings,
) -> StoryContent {
    let article_text = match fetch_html(client, &story.article_url).await {
        Ok(html) => article::extract_article_text(&html),
        Err(e) => {
            warn!(url = %story.article_url, error = %e, "Article fetch failed");
            String::new()
        }
    };

    let comments_text = match fetch_html(client, &story.comments_url).await {
        Ok(html) => hackernews::extract_comments(&html, &settings.comment_separator),
        Err(e) => {
            warn!(url = %story.comments_url, error = %e, "Discussion fetch failed");
            String::new()
        }
    };

    info!(
        article_chars = article_text.chars().count(),
        comments_chars = comments_text.chars().count(),
        "Scraped story content"
    );

    StoryContent {
        article_text: truncate_with_marker(
            &article_text,
            settings.max_article_chars,
            &settings.truncation_marker,
        ),
        comments_text: truncate_with_marker(
            &comments_text,
            settings.max_comments_chars,
            &settings.truncation_marker,
        ),
    }
}

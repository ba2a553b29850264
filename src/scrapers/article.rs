//! Generic article text extraction.
//!
//! Article pages come from anywhere, so there is no site-specific selector.
//! The extractor looks for a primary-content container and falls back to the
//! whole page, ignoring page chrome (scripts, styles, navigation, headers,
//! footers and sidebars).

use crate::utils::normalize_whitespace;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Elements whose text never belongs to the article body.
const CHROME: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Primary-content candidates, in order of preference.
static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        "main",
        "div[class*='content'], div[class*='article'], div[class*='post']",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

fn is_chrome(element: &ElementRef<'_>) -> bool {
    CHROME.contains(&element.value().name())
}

fn inside_chrome(element: &ElementRef<'_>) -> bool {
    is_chrome(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_chrome(&ancestor))
}

/// Push every stripped, non-empty text node under `element`, skipping chrome.
fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !is_chrome(&child_element) {
                collect_text(child_element, out);
            }
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
    }
}

/// Find the container holding the article body, if the page has one.
fn primary_content(document: &Html) -> Option<ElementRef<'_>> {
    CONTENT_SELECTORS.iter().find_map(|selector| {
        document
            .select(selector)
            .find(|candidate| !inside_chrome(candidate))
    })
}

/// Extract readable text from an article page.
///
/// Text fragments are joined with newlines, then blank-line runs and
/// repeated spaces are collapsed. Returns an empty string for a page with no
/// text.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match primary_content(&document) {
        Some(container) => {
            debug!(tag = container.value().name(), "Using primary content container");
            container
        }
        None => {
            debug!("No content container; falling back to page text");
            document.root_element()
        }
    };

    let mut fragments = Vec::new();
    collect_text(root, &mut fragments);
    normalize_whitespace(&fragments.join("\n"))
}

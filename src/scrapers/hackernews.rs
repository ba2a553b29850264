//! Hacker News listing and discussion scraper.
//!
//! The front page is a table where every story is a `tr.athing` row whose
//! `id` attribute is the item id, with the headline link inside
//! `span.titleline`. Discussion pages hold one `div.comment` per comment with
//! the body in `span.commtext`.

use super::fetch_html;
use crate::models::Story;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr.athing").unwrap());
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.titleline a").unwrap());
static COMMENT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div.comment").unwrap());
static COMMTEXT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.commtext").unwrap());

/// Stripped text fragments of `element`, joined by `separator`.
fn stripped_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn parse_row(row: ElementRef<'_>, base: &Url) -> Option<Story> {
    let item_id = row.value().attr("id").map(str::trim).filter(|id| !id.is_empty())?;
    let link = row.select(&TITLE_LINK_SELECTOR).next()?;
    let href = link.value().attr("href").filter(|h| !h.trim().is_empty())?;

    let article_url = base.join(href.trim()).ok()?;
    let comments_url = base.join(&format!("item?id={item_id}")).ok()?;

    Some(Story {
        title: stripped_text(link, " "),
        article_url: article_url.to_string(),
        comments_url: comments_url.to_string(),
    })
}

/// Parse the stories of a listing page, in document order.
///
/// Rows missing an id, a title link or an `href` are skipped without error.
/// Relative links (e.g. `item?id=…` for Ask HN posts) are resolved against
/// `base`, and so is the discussion link.
pub fn parse_listing(html: &str, base: &Url) -> Vec<Story> {
    let document = Html::parse_document(html);
    let mut stories = Vec::new();
    let mut skipped = 0usize;

    for row in document.select(&ROW_SELECTOR) {
        match parse_row(row, base) {
            Some(story) => stories.push(story),
            None => skipped += 1,
        }
    }

    debug!(count = stories.len(), skipped, "Parsed listing rows");
    stories
}

/// Fetch the listing at `listing_url` and extract its stories.
///
/// Never fails: an invalid URL, a network error or an error status is
/// logged and yields an empty list.
#[instrument(level = "info", skip(client))]
pub async fn index_stories(client: &Client, listing_url: &str) -> Vec<Story> {
    let base = match Url::parse(listing_url) {
        Ok(url) if url.has_host() && !url.scheme().is_empty() => url,
        Ok(_) | Err(_) => {
            error!(url = %listing_url, "Invalid listing URL format");
            return Vec::new();
        }
    };

    let html = match fetch_html(client, listing_url).await {
        Ok(html) => html,
        Err(e) => {
            error!(url = %listing_url, error = %e, "Listing fetch failed");
            return Vec::new();
        }
    };

    let stories = parse_listing(&html, &base);
    if stories.is_empty() {
        warn!(url = %listing_url, "Listing page produced no stories");
    } else {
        info!(count = stories.len(), source = %listing_url, "Indexed stories");
    }
    stories
}

/// Concatenate the comment bodies of a discussion page.
///
/// Each `div.comment` contributes the text of its first `span.commtext`,
/// fragments joined by a single space. Comments are joined in document
/// order by `separator`.
pub fn extract_comments(html: &str, separator: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&COMMENT_SELECTOR)
        .filter_map(|comment| comment.select(&COMMTEXT_SELECTOR).next())
        .map(|body| stripped_text(body, " "))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEPARATOR: &str = "\n\n---\n\n";

    fn base() -> Url {
        Url::parse("https://news.ycombinator.com/").unwrap()
    }

    fn row(id: &str, inner: &str) -> String {
        format!(
            r#"<tr class="athing submission" id="{id}">
                 <td class="title"><span class="rank">1.</span></td>
                 <td class="title">{inner}</td>
               </tr>
               <tr><td class="subtext">points</td></tr>"#
        )
    }

    fn listing(rows: &[String]) -> String {
        format!(
            "<html><body><table>{}</table></body></html>",
            rows.concat()
        )
    }

    #[test]
    fn test_parse_listing_well_formed_rows() {
        let html = listing(&[
            row(
                "101",
                r#"<span class="titleline"><a href="https://example.com/a">First story</a> <span class="sitebit">(example.com)</span></span>"#,
            ),
            row(
                "102",
                r#"<span class="titleline"><a href="item?id=102">Ask HN: Second</a></span>"#,
            ),
        ]);

        let stories = parse_listing(&html, &base());

        assert_eq!(
            stories,
            vec![
                Story {
                    title: "First story".to_string(),
                    article_url: "https://example.com/a".to_string(),
                    comments_url: "https://news.ycombinator.com/item?id=101".to_string(),
                },
                Story {
                    title: "Ask HN: Second".to_string(),
                    article_url: "https://news.ycombinator.com/item?id=102".to_string(),
                    comments_url: "https://news.ycombinator.com/item?id=102".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_listing_skips_malformed_rows_and_keeps_order() {
        let good = |id: &str, title: &str| {
            row(
                id,
                &format!(
                    r#"<span class="titleline"><a href="https://example.com/{id}">{title}</a></span>"#
                ),
            )
        };
        let html = listing(&[
            good("1", "One"),
            // no id attribute
            r#"<tr class="athing"><td><span class="titleline"><a href="https://x.test">No id</a></span></td></tr>"#.to_string(),
            good("2", "Two"),
            // no titleline span
            row("3", r#"<a href="https://example.com/3">Loose link</a>"#),
            // titleline without a link
            row("4", r#"<span class="titleline">Just text</span>"#),
            // empty href
            row("5", r#"<span class="titleline"><a href="">Empty</a></span>"#),
            good("6", "Three"),
        ]);

        let titles: Vec<String> = parse_listing(&html, &base())
            .into_iter()
            .map(|s| s.title)
            .collect();

        assert_eq!(titles, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_parse_listing_resolves_against_paged_listing_url() {
        let base = Url::parse("https://news.ycombinator.com/news?p=2").unwrap();
        let html = listing(&[row(
            "77",
            r#"<span class="titleline"><a href="from?site=example.com">Relative</a></span>"#,
        )]);

        let stories = parse_listing(&html, &base);

        assert_eq!(stories.len(), 1);
        assert_eq!(
            stories[0].article_url,
            "https://news.ycombinator.com/from?site=example.com"
        );
        assert_eq!(
            stories[0].comments_url,
            "https://news.ycombinator.com/item?id=77"
        );
    }

    #[test]
    fn test_parse_listing_of_unrelated_page_is_empty() {
        let html = "<html><body><p>Nothing to see</p></body></html>";
        assert!(parse_listing(html, &base()).is_empty());
    }

    #[test]
    fn test_extract_comments_in_document_order() {
        let html = r#"
            <table>
              <tr><td><div class="comment"><span class="commtext c00">First <i>comment</i>
                 <p>second paragraph</p></span></div></td></tr>
              <tr><td><div class="comment"><span class="commtext c5a">[flagged]</span></div></td></tr>
              <tr><td><div class="comment"></div></td></tr>
              <tr><td><div class="comment"><span class="commtext c00">Third</span></div></td></tr>
            </table>"#;

        assert_eq!(
            extract_comments(html, SEPARATOR),
            "First comment second paragraph\n\n---\n\n[flagged]\n\n---\n\nThird"
        );
    }

    #[test]
    fn test_extract_comments_without_comments() {
        assert_eq!(extract_comments("<html></html>", SEPARATOR), "");
    }

    #[tokio::test]
    async fn test_index_stories_invalid_url_is_empty() {
        let client = Client::new();
        assert!(index_stories(&client, "not a url").await.is_empty());
        assert!(index_stories(&client, "mailto:someone@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_index_stories_http_error_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = Client::new();
        let stories = index_stories(&client, &format!("{}/", server.url())).await;

        assert!(stories.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_index_stories_fetches_and_parses() {
        let mut server = mockito::Server::new_async().await;
        let body = listing(&[row(
            "9",
            r#"<span class="titleline"><a href="https://example.com/9">Nine</a></span>"#,
        )]);
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = Client::new();
        let listing_url = format!("{}/", server.url());
        let stories = index_stories(&client, &listing_url).await;

        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "Nine");
        assert_eq!(stories[0].comments_url, format!("{}item?id=9", listing_url));
    }
}

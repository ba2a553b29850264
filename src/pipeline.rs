//! One newsletter run, stage by stage.
//!
//! [`run`] drives the whole sequence and reports where it stopped as a
//! [`RunOutcome`]. The selection call is the only step whose failure ends
//! the run with an error; a failed summary just drops that story, and a
//! failed render or send is logged and reported in the outcome.

use crate::api::{AskAsync, LlmError, ask_logged};
use crate::config::{AppConfig, ModelSettings, ScrapingSettings};
use crate::mailer::{newsletter_subject, send_newsletter_email};
use crate::models::{ArticleSummary, Story};
use crate::outputs::newsletter::{display_date, render_newsletter, write_newsletter};
use crate::prompts::{
    build_selection_prompt, build_summary_prompt, load_prompt_context, parse_selection,
};
use crate::scrapers::{fetch_story_content, hackernews::index_stories};
use crate::utils::truncate_for_log;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Where a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The listing produced no stories; the model was never called.
    NoStories,
    /// The model picked nothing usable.
    NothingSelected,
    /// The template could not be rendered; no email was sent.
    RenderFailed,
    /// The newsletter was rendered. `sent` is false on dry runs and on
    /// failed sends.
    Finished { summaries: usize, sent: bool },
}

/// Run the whole pipeline once: index, select, summarize, render, send.
///
/// `html_output` additionally writes the rendered newsletter to that path;
/// `dry_run` skips the send.
///
/// # Errors
///
/// Only the selection call is fatal. Its error is returned once retries are
/// exhausted.
#[instrument(level = "info", skip(config, api, http))]
pub async fn run<A>(
    config: &AppConfig,
    api: &A,
    http: &Client,
    html_output: Option<&str>,
    dry_run: bool,
) -> Result<RunOutcome, LlmError>
where
    A: AskAsync<Response = String>,
{
    let settings = &config.settings;
    let keywords = &settings.keywords;

    // ---- Index stories ----
    let stories = index_stories(http, &settings.listing_url).await;
    if stories.is_empty() {
        warn!("No stories found; nothing to select from");
        return Ok(RunOutcome::NoStories);
    }
    for (i, story) in stories.iter().take(10).enumerate() {
        info!(index = i + 1, title = %story.title, article = %story.article_url, comments = %story.comments_url, "Story");
    }

    // ---- Selection ----
    let prompt_context = load_prompt_context(&settings.newsletter.prompt_context_path);
    let selected = select_stories(api, &prompt_context, &stories, keywords).await?;
    if selected.is_empty() {
        info!("No articles were selected by the model");
        return Ok(RunOutcome::NothingSelected);
    }
    let selection = resolve_selection(&selected, &stories);
    info!(selected = selected.len(), valid = selection.len(), "Processing selected stories");

    // ---- Summaries ----
    let summaries = summarize_selection(
        api,
        http,
        &selection,
        keywords,
        &settings.scraping,
        &settings.model,
    )
    .await;
    for item in &summaries {
        info!(
            index = item.index,
            title = %item.title,
            summary = %truncate_for_log(&item.summary, 500),
            "Newsletter entry"
        );
    }
    info!(count = summaries.len(), "Summaries collected");

    // ---- Render ----
    let html = render_newsletter(
        &summaries,
        keywords,
        stories.len(),
        &settings.newsletter.template_path,
    );
    if html.is_empty() {
        error!("Failed to render email template; email not sent");
        return Ok(RunOutcome::RenderFailed);
    }

    if let Some(path) = html_output
        && let Err(e) = write_newsletter(&html, path).await
    {
        error!(%path, error = %e, "Failed to write newsletter HTML");
    }

    // ---- Send ----
    let sent = if dry_run {
        info!("Dry run; newsletter not sent");
        false
    } else {
        let subject = newsletter_subject(keywords, &display_date());
        info!(%subject, recipients = ?config.recipients, "Sending newsletter email");
        let sent = send_newsletter_email(
            &html,
            &config.recipients,
            &subject,
            &settings.mail,
            &config.mail,
        )
        .await;
        if sent {
            info!("Newsletter sent successfully");
        } else {
            error!("Failed to send newsletter email");
        }
        sent
    };

    Ok(RunOutcome::Finished {
        summaries: summaries.len(),
        sent,
    })
}

/// Ask the model which stories match `keywords` and return its 1-based picks.
///
/// # Errors
///
/// Propagates the model error once retries are exhausted, or immediately
/// for non-transient failures.
#[instrument(level = "info", skip_all, fields(stories = stories.len()))]
pub async fn select_stories<A>(
    api: &A,
    prompt_context: &str,
    stories: &[Story],
    keywords: &[String],
) -> Result<Vec<usize>, LlmError>
where
    A: AskAsync<Response = String>,
{
    let prompt = build_selection_prompt(prompt_context, stories, keywords);
    debug!(prompt_chars = prompt.chars().count(), "Built selection prompt");

    let reply = ask_logged(api, &prompt).await?;
    info!(reply = %truncate_for_log(&reply, 300), "Model selection reply");

    let selected = parse_selection(&reply);
    info!(?selected, "Selected story indexes");
    Ok(selected)
}

/// Map 1-based picks onto the story list, skipping anything out of range.
pub fn resolve_selection<'a>(selected: &[usize], stories: &'a [Story]) -> Vec<(usize, &'a Story)> {
    selected
        .iter()
        .filter_map(|&index| {
            let story = index.checked_sub(1).and_then(|i| stories.get(i));
            if story.is_none() {
                warn!(index, count = stories.len(), "Index is out of range; skipping");
            }
            story.map(|story| (index, story))
        })
        .collect()
}

/// Fetch, prompt and summarize every selected story, in selection order.
///
/// Stories without any scraped text, whose summary call fails, or whose
/// summary comes back blank are skipped. After each successful summary the
/// run pauses for the configured courtesy delay.
#[instrument(level = "info", skip_all, fields(selected = selection.len()))]
pub async fn summarize_selection<A>(
    api: &A,
    http: &Client,
    selection: &[(usize, &Story)],
    keywords: &[String],
    scraping: &ScrapingSettings,
    model: &ModelSettings,
) -> Vec<ArticleSummary>
where
    A: AskAsync<Response = String>,
{
    let mut summaries = Vec::with_capacity(selection.len());

    for &(index, story) in selection {
        info!(index, title = %story.title, article = %story.article_url, comments = %story.comments_url, "Processing story");

        let content = fetch_story_content(http, story, scraping).await;
        if content.is_empty() {
            warn!(index, "Failed to scrape content; skipping");
            continue;
        }

        let prompt = build_summary_prompt(
            &story.title,
            &content.article_text,
            &content.comments_text,
            keywords,
        );

        let summary = match ask_logged(api, &prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(index, error = %e, "Error generating summary; skipping");
                continue;
            }
        };

        if summary.trim().is_empty() {
            warn!(index, "Model returned an empty summary; skipping");
            continue;
        }

        info!(index, "Summary generated");
        summaries.push(ArticleSummary::new(index, story, summary));
        sleep(model.courtesy_delay()).await;
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MailCredentials, Settings};
    use mockito::Matcher;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::default(),
            }
        }
    }

    impl AskAsync for Scripted {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(text.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn story(n: usize, base: &str) -> Story {
        Story {
            title: format!("Story {n}"),
            article_url: format!("{base}/article/{n}"),
            comments_url: format!("{base}/item/{n}"),
        }
    }

    fn no_delay() -> ModelSettings {
        ModelSettings {
            courtesy_delay_ms: 0,
            ..ModelSettings::default()
        }
    }

    #[test]
    fn test_resolve_selection_skips_out_of_range() {
        let stories: Vec<Story> = (1..=3).map(|n| story(n, "https://x.test")).collect();

        let resolved = resolve_selection(&[0, 2, 4, 3, 2, 99], &stories);

        let picked: Vec<(usize, &str)> = resolved
            .iter()
            .map(|(i, s)| (*i, s.title.as_str()))
            .collect();
        assert_eq!(picked, vec![(2, "Story 2"), (3, "Story 3"), (2, "Story 2")]);
    }

    #[test]
    fn test_resolve_selection_with_no_stories() {
        assert!(resolve_selection(&[1, 2], &[]).is_empty());
    }

    #[tokio::test]
    async fn test_select_stories_parses_reply() {
        let api = Scripted::new(vec![Ok("\"3\", \"17\", \"2\"".to_string())]);
        let stories = vec![story(1, "https://x.test")];
        let keywords = vec!["Gaming".to_string()];

        let selected = select_stories(&api, "Pick.", &stories, &keywords)
            .await
            .unwrap();

        assert_eq!(selected, vec![3, 17, 2]);
        let prompts = api.prompts.lock().unwrap();
        assert!(prompts[0].contains("1. Story 1"));
        assert!(prompts[0].contains("KEYWORDS: Gaming"));
    }

    #[tokio::test]
    async fn test_select_stories_propagates_model_error() {
        let api = Scripted::new(vec![Err(LlmError::Status {
            status: 403,
            message: "denied".to_string(),
        })]);

        let err = select_stories(&api, "Pick.", &[], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_summarize_selection_skips_failures() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let mut mocks = Vec::new();
        for n in 1..=3 {
            let article = server
                .mock("GET", format!("/article/{n}").as_str())
                .with_status(200)
                .with_body(format!("<article><p>Body of {n}</p></article>"))
                .create_async()
                .await;
            let comments = server
                .mock("GET", format!("/item/{n}").as_str())
                .with_status(200)
                .with_body(format!(
                    r#"<div class="comment"><span class="commtext">Comment on {n}</span></div>"#
                ))
                .create_async()
                .await;
            mocks.push(article);
            mocks.push(comments);
        }
        // story 4 has neither an article nor a discussion page
        let stories: Vec<Story> = (1..=4).map(|n| story(n, &base)).collect();
        let selection = resolve_selection(&[1, 4, 2, 3], &stories);

        let api = Scripted::new(vec![
            Ok("**Summary one**".to_string()),
            Err(LlmError::Status {
                status: 500,
                message: "boom".to_string(),
            }),
            Ok("   ".to_string()),
        ]);
        let keywords = vec!["Gaming".to_string()];
        let scraping = ScrapingSettings::default();
        let http = crate::scrapers::build_client(&scraping).unwrap();

        let summaries =
            summarize_selection(&api, &http, &selection, &keywords, &scraping, &no_delay()).await;

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].index, 1);
        assert_eq!(summaries[0].title, "Story 1");
        assert_eq!(summaries[0].summary, "**Summary one**");

        let prompts = api.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("ARTICLE CONTENT:\nBody of 1"));
        assert!(prompts[0].contains("HACKER NEWS COMMENTS:\nComment on 1"));
        assert!(prompts[1].contains("ARTICLE TITLE: Story 2"));
        assert!(prompts[2].contains("ARTICLE TITLE: Story 3"));
    }

    fn app_config(base: &str) -> AppConfig {
        let mut settings = Settings::default();
        settings.listing_url = format!("{base}/");
        settings.keywords = vec!["Gaming".to_string()];
        settings.model.courtesy_delay_ms = 0;
        settings.newsletter.template_path =
            concat!(env!("CARGO_MANIFEST_DIR"), "/templates/email_template.html").to_string();
        settings.mail.authority_host = base.to_string();
        settings.mail.graph_base = base.to_string();
        AppConfig {
            settings,
            gemini_api_key: "test-key".to_string(),
            mail: MailCredentials {
                client_id: Some("client-1".to_string()),
                tenant_id: Some("tenant-1".to_string()),
                client_secret: Some("s3cret".to_string()),
                sender_email: Some("sender@example.com".to_string()),
            },
            recipients: vec!["reader@example.com".to_string()],
        }
    }

    fn listing_row(id: usize, base: &str) -> String {
        format!(
            r#"<tr class="athing" id="{id}"><td><span class="titleline"><a href="{base}/article/{id}">Story {id}</a></span></td></tr>"#
        )
    }

    async fn serve_listing(server: &mut mockito::ServerGuard, rows: &str) -> mockito::Mock {
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(format!("<html><body><table>{rows}</table></body></html>"))
            .create_async()
            .await
    }

    async fn serve_story(server: &mut mockito::ServerGuard, id: usize) -> Vec<mockito::Mock> {
        let article = server
            .mock("GET", format!("/article/{id}").as_str())
            .with_status(200)
            .with_body(format!("<article><p>Body of {id}</p></article>"))
            .create_async()
            .await;
        let comments = server
            .mock("GET", "/item")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"<div class="comment"><span class="commtext">Comment on {id}</span></div>"#
            ))
            .create_async()
            .await;
        vec![article, comments]
    }

    #[tokio::test]
    async fn test_run_empty_listing_never_calls_model() {
        let mut server = mockito::Server::new_async().await;
        let _listing = serve_listing(&mut server, "").await;
        let config = app_config(&server.url());
        let http = crate::scrapers::build_client(&config.settings.scraping).unwrap();
        let api = Scripted::new(vec![Ok("1".to_string())]);

        let outcome = run(&config, &api, &http, None, true).await.unwrap();

        assert_eq!(outcome, RunOutcome::NoStories);
        assert!(api.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_reply_without_numbers_renders_nothing() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let rows = format!("{}{}", listing_row(1, &base), listing_row(2, &base));
        let _listing = serve_listing(&mut server, &rows).await;
        let config = app_config(&base);
        let http = crate::scrapers::build_client(&config.settings.scraping).unwrap();
        let api = Scripted::new(vec![Ok("None of these match.".to_string())]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("newsletter.html");

        let outcome = run(&config, &api, &http, out.to_str(), true)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::NothingSelected);
        assert_eq!(api.prompts.lock().unwrap().len(), 1);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_run_missing_template_sends_no_mail() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let _listing = serve_listing(&mut server, &listing_row(1, &base)).await;
        let _story = serve_story(&mut server, 1).await;
        let token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .expect(0)
            .create_async()
            .await;
        let mut config = app_config(&base);
        config.settings.newsletter.template_path = "/nonexistent/email_template.html".to_string();
        let http = crate::scrapers::build_client(&config.settings.scraping).unwrap();
        let api = Scripted::new(vec![Ok("1".to_string()), Ok("A summary.".to_string())]);

        let outcome = run(&config, &api, &http, None, false).await.unwrap();

        assert_eq!(outcome, RunOutcome::RenderFailed);
        assert_eq!(api.prompts.lock().unwrap().len(), 2);
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_selection_error_ends_run() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let _listing = serve_listing(&mut server, &listing_row(1, &base)).await;
        let config = app_config(&base);
        let http = crate::scrapers::build_client(&config.settings.scraping).unwrap();
        let api = Scripted::new(vec![Err(LlmError::Status {
            status: 500,
            message: "internal".to_string(),
        })]);

        let err = run(&config, &api, &http, None, false).await.unwrap_err();

        assert!(matches!(err, LlmError::Status { status: 500, .. }));
        assert_eq!(api.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_dry_run_writes_newsletter() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let _listing = serve_listing(&mut server, &listing_row(1, &base)).await;
        let _story = serve_story(&mut server, 1).await;
        let token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .expect(0)
            .create_async()
            .await;
        let config = app_config(&base);
        let http = crate::scrapers::build_client(&config.settings.scraping).unwrap();
        let api = Scripted::new(vec![Ok("1".to_string()), Ok("**Retro** news.".to_string())]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/newsletter.html");

        let outcome = run(&config, &api, &http, out.to_str(), true)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Finished {
                summaries: 1,
                sent: false
            }
        );
        let html = std::fs::read_to_string(&out).unwrap();
        assert!(html.contains("Your Gaming Newsletter"));
        assert!(html.contains("<strong>Retro</strong> news."));
        token.assert_async().await;
    }
}

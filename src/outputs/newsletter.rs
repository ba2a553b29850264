//! Newsletter rendering.
//!
//! Summaries come back from the model as Markdown. They are converted to
//! HTML and handed, together with the run's totals, to a Jinja-style
//! template loaded from disk. Rendering never fails the run: a missing
//! template or a render error is logged and produces an empty string, which
//! the caller treats as "nothing to send".

use crate::models::{ArticleSummary, NewsletterView};
use chrono::Local;
use minijinja::Environment;
use pulldown_cmark::{Event, Options, Parser, html};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Name the template is registered under. The `.html` suffix turns on
/// HTML auto-escaping for every variable not marked `safe`.
const TEMPLATE_NAME: &str = "newsletter.html";

/// Convert a Markdown summary to HTML.
///
/// Tables, footnotes and strikethrough are enabled, and single newlines
/// become `<br />` so the model's line structure survives.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// `"Your Gaming & Rust Newsletter"`, or a generic title without keywords.
pub fn newsletter_title(keywords: &[String]) -> String {
    if keywords.is_empty() {
        "Your Tech Newsletter".to_string()
    } else {
        format!("Your {} Newsletter", keywords.join(" & "))
    }
}

/// Today's date as shown in the newsletter and its subject, e.g. `May 06, 2025`.
pub fn display_date() -> String {
    Local::now().format("%B %d, %Y").to_string()
}

/// Render the newsletter from the template at `template_path`.
///
/// Returns an empty string if the template cannot be read or rendered.
#[instrument(level = "info", skip(summaries, keywords), fields(articles = summaries.len()))]
pub fn render_newsletter(
    summaries: &[ArticleSummary],
    keywords: &[String],
    total_articles: usize,
    template_path: &str,
) -> String {
    render_with_date(summaries, keywords, total_articles, template_path, &display_date())
}

fn render_with_date(
    summaries: &[ArticleSummary],
    keywords: &[String],
    total_articles: usize,
    template_path: &str,
    date: &str,
) -> String {
    let source = match std::fs::read_to_string(template_path) {
        Ok(source) => source,
        Err(e) => {
            error!(path = %template_path, error = %e, "Email template not found");
            return String::new();
        }
    };

    let view = NewsletterView {
        newsletter_title: newsletter_title(keywords),
        date: date.to_string(),
        keywords,
        total_articles,
        selected_count: summaries.len(),
        articles: summaries
            .iter()
            .map(|s| ArticleSummary {
                summary: markdown_to_html(&s.summary),
                ..s.clone()
            })
            .collect(),
    };

    let mut env = Environment::new();
    let rendered = env
        .add_template(TEMPLATE_NAME, &source)
        .and_then(|_| env.get_template(TEMPLATE_NAME))
        .and_then(|template| template.render(&view));

    match rendered {
        Ok(html) => {
            info!(chars = html.len(), "Rendered newsletter");
            html
        }
        Err(e) => {
            error!(path = %template_path, error = %e, "Error rendering email template");
            String::new()
        }
    }
}

/// Write the rendered newsletter to `path`, creating parent directories.
#[instrument(level = "info", skip(html))]
pub async fn write_newsletter(html: &str, path: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, html).await?;
    info!(%path, "Wrote newsletter HTML");
    Ok(())
}

//! # HN Newsletter
//!
//! A one-shot pipeline that turns the Hacker News front page into a short,
//! personal newsletter: a generative model picks the stories that match a
//! keyword list, each pick is summarized together with its discussion, and
//! the result is rendered to HTML and mailed through Microsoft Graph.
//!
//! ## Usage
//!
//! ```sh
//! hn_newsletter -k Gaming -k Hardware
//! hn_newsletter -c ./newsletter.yaml --dry-run --html-output ./out/newsletter.html
//! ```
//!
//! ## Architecture
//!
//! The run is strictly sequential:
//! 1. **Indexing**: scrape the listing page into stories
//! 2. **Selection**: ask the model which stories match the keywords
//! 3. **Summarizing**: fetch article and comments for each pick, ask the model
//!    for a summary
//! 4. **Output**: render the newsletter and send it by email

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod mailer;
mod models;
mod outputs;
mod pipeline;
mod prompts;
mod scrapers;
mod utils;

use api::{GeminiClient, RetryAsk};
use cli::Cli;
use config::AppConfig;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("hn_newsletter starting up");

    // .env first so clap's `env` attributes can see it
    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    let args = Cli::parse();
    debug!(config = ?args.config, url = ?args.url, keywords = ?args.keywords, dry_run = args.dry_run, "Parsed CLI arguments");

    let config = match AppConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    let settings = &config.settings;
    let http = scrapers::build_client(&settings.scraping)?;
    let model = RetryAsk::from_settings(
        GeminiClient::new(&settings.model, &config.gemini_api_key)?,
        &settings.model,
    );

    let outcome = pipeline::run(
        &config,
        &model,
        &http,
        args.html_output.as_deref(),
        args.dry_run,
    )
    .await?;

    let elapsed = start_time.elapsed();
    info!(
        ?outcome,
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

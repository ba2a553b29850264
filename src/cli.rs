//! Command-line interface definitions for the newsletter pipeline.
//!
//! Every secret can be passed as a flag but is normally picked up from the
//! environment (or a `.env` file loaded before parsing).

use clap::Parser;

/// Command-line arguments for the newsletter pipeline.
///
/// # Examples
///
/// ```sh
/// # Keywords on the command line, credentials from .env
/// hn_newsletter -k Gaming -k Rust
///
/// # Render only, keep a copy of the HTML
/// hn_newsletter -c ./newsletter.yaml --dry-run --html-output ./newsletter.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Listing page to scrape (overrides the settings file)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Keywords the model selects stories against (repeat or comma-separate)
    #[arg(short, long = "keyword", value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Newsletter recipients
    #[arg(short, long = "recipient", env = "RECIPIENT_EMAIL", value_delimiter = ',')]
    pub recipients: Vec<String>,

    /// Also write the rendered newsletter to this file
    #[arg(long)]
    pub html_output: Option<String>,

    /// Render the newsletter but do not send it
    #[arg(long)]
    pub dry_run: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Azure application (client) id used for the Graph token exchange
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Azure tenant id
    #[arg(long, env = "TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Azure client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Mailbox the newsletter is sent from
    #[arg(long, env = "SENDER_EMAIL")]
    pub sender_email: Option<String>,
}

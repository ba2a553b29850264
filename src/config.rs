//! Runtime configuration.
//!
//! [`AppConfig`] is built once in `main` from three layers, lowest first:
//! built-in defaults, an optional YAML settings file, and the command line
//! (which also carries the secrets read from the environment). It is then
//! passed by reference to every stage that needs it.
//!
//! ```yaml
//! listing_url: https://news.ycombinator.com/
//! keywords: [Gaming, Rust]
//! scraping:
//!   max_article_chars: 5000
//! model:
//!   retry_delays_secs: [1, 2, 4]
//! ```

use crate::cli::Cli;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
}

/// Settings that can live in the YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listing_url: String,
    pub keywords: Vec<String>,
    pub scraping: ScrapingSettings,
    pub model: ModelSettings,
    pub newsletter: NewsletterSettings,
    pub mail: MailSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listing_url: "https://news.ycombinator.com/".to_string(),
            keywords: vec!["Gaming".to_string()],
            scraping: ScrapingSettings::default(),
            model: ModelSettings::default(),
            newsletter: NewsletterSettings::default(),
            mail: MailSettings::default(),
        }
    }
}

/// HTTP and text-extraction parameters for the scrapers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_article_chars: usize,
    pub max_comments_chars: usize,
    pub truncation_marker: String,
    pub comment_separator: String,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            timeout_secs: 10,
            max_article_chars: 5000,
            max_comments_chars: 3000,
            truncation_marker: "\n...[truncated]".to_string(),
            comment_separator: "\n\n---\n\n".to_string(),
        }
    }
}

impl ScrapingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Generative model endpoint and retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub retry_delays_secs: Vec<u64>,
    /// Pause after each summary call.
    pub courtesy_delay_ms: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            timeout_secs: 120,
            max_attempts: 3,
            retry_delays_secs: vec![1, 2, 4],
            courtesy_delay_ms: 500,
        }
    }
}

impl ModelSettings {
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .copied()
            .map(Duration::from_secs)
            .collect()
    }

    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }
}

/// Prompt and template resources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsletterSettings {
    pub template_path: String,
    pub prompt_context_path: String,
}

impl Default for NewsletterSettings {
    fn default() -> Self {
        Self {
            template_path: "templates/email_template.html".to_string(),
            prompt_context_path: "prompts/newsletter_prompt_context.md".to_string(),
        }
    }
}

/// Identity provider and mail API endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub authority_host: String,
    pub graph_base: String,
    pub scope: String,
    pub success_status: u16,
    pub timeout_secs: u64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            authority_host: "https://login.microsoftonline.com".to_string(),
            graph_base: "https://graph.microsoft.com".to_string(),
            scope: "https://graph.microsoft.com/.default".to_string(),
            success_status: 202,
            timeout_secs: 30,
        }
    }
}

/// Credentials for the client-credential exchange and the sending mailbox.
///
/// All fields are optional here; presence is only checked right before
/// sending so a missing value aborts the send step and nothing else.
#[derive(Clone, Default)]
pub struct MailCredentials {
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secret: Option<String>,
    pub sender_email: Option<String>,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("sender_email", &self.sender_email)
            .finish()
    }
}

/// Everything the pipeline needs, assembled once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub settings: Settings,
    pub gemini_api_key: String,
    pub mail: MailCredentials,
    pub recipients: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("settings", &self.settings)
            .field("gemini_api_key", &"<redacted>")
            .field("mail", &self.mail)
            .field("recipients", &self.recipients)
            .finish()
    }
}

impl AppConfig {
    /// Build the configuration from the parsed command line.
    ///
    /// # Errors
    ///
    /// Fails when the settings file cannot be read or parsed, or when no
    /// model API key was supplied.
    #[instrument(level = "info", skip_all)]
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut settings = match cli.config.as_deref() {
            Some(path) => load_settings(path)?,
            None => Settings::default(),
        };

        if let Some(url) = &cli.url {
            settings.listing_url = url.clone();
        }
        let keywords = clean_list(&cli.keywords);
        if !keywords.is_empty() {
            settings.keywords = keywords;
        }

        let gemini_api_key = non_empty(&cli.gemini_api_key).ok_or(ConfigError::MissingApiKey)?;

        let config = Self {
            settings,
            gemini_api_key,
            mail: MailCredentials {
                client_id: non_empty(&cli.client_id),
                tenant_id: non_empty(&cli.tenant_id),
                client_secret: non_empty(&cli.client_secret),
                sender_email: non_empty(&cli.sender_email),
            },
            recipients: clean_list(&cli.recipients),
        };
        info!(
            listing_url = %config.settings.listing_url,
            keywords = ?config.settings.keywords,
            recipients = config.recipients.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Read and parse a YAML settings file.
pub fn load_settings(path: &str) -> Result<Settings, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_settings(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

fn parse_settings(raw: &str) -> Result<Settings, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(raw)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

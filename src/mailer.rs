//! Email dispatch through Microsoft Graph.
//!
//! Sending is two HTTP calls: an OAuth2 client-credentials exchange against
//! the identity provider for a bearer token, then a `sendMail` POST on behalf
//! of the sender mailbox. Graph accepts a message with `202 Accepted`; any
//! other outcome counts as a failure.
//!
//! [`send_newsletter_email`] never returns an error. Every failure, including
//! missing credentials, is logged and reported as `false` so the caller can
//! decide what a failed send means for the run.

use crate::config::{MailCredentials, MailSettings};
use itertools::Itertools;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing mail configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
    #[error("no recipients configured")]
    NoRecipients,
    #[error("failed to acquire access token: {0}")]
    Token(String),
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Credentials after the presence check.
#[derive(Debug)]
struct ValidCredentials<'a> {
    client_id: &'a str,
    tenant_id: &'a str,
    client_secret: &'a str,
    sender_email: &'a str,
}

fn validate(credentials: &MailCredentials) -> Result<ValidCredentials<'_>, MailError> {
    let fields = [
        ("CLIENT_ID", &credentials.client_id),
        ("TENANT_ID", &credentials.tenant_id),
        ("CLIENT_SECRET", &credentials.client_secret),
        ("SENDER_EMAIL", &credentials.sender_email),
    ];
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(MailError::MissingCredentials(missing));
    }

    fn get(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or_default()
    }
    Ok(ValidCredentials {
        client_id: get(&credentials.client_id),
        tenant_id: get(&credentials.tenant_id),
        client_secret: get(&credentials.client_secret),
        sender_email: get(&credentials.sender_email),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    message: Message<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Message<'a> {
    subject: &'a str,
    body: Body<'a>,
    to_recipients: Vec<Recipient<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Body<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
    email_address: EmailAddress<'a>,
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    address: &'a str,
}

/// Subject line for a newsletter sent on `date`.
pub fn newsletter_subject(keywords: &[String], date: &str) -> String {
    format!("Your {} Newsletter - {}", keywords.iter().join(", "), date)
}

/// Exchange the client credentials for a bearer token.
#[instrument(level = "info", skip_all, fields(tenant = %credentials.tenant_id))]
async fn acquire_token(
    http: &Client,
    settings: &MailSettings,
    credentials: &ValidCredentials<'_>,
) -> Result<String, MailError> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        settings.authority_host.trim_end_matches('/'),
        urlencoding::encode(credentials.tenant_id)
    );
    let form = [
        ("client_id", credentials.client_id),
        ("client_secret", credentials.client_secret),
        ("scope", settings.scope.as_str()),
        ("grant_type", "client_credentials"),
    ];

    let response = http.post(&url).form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    let parsed = serde_json::from_str::<TokenResponse>(&body).ok();
    match parsed {
        Some(TokenResponse {
            access_token: Some(token),
            ..
        }) if status.is_success() && !token.is_empty() => Ok(token),
        Some(TokenResponse {
            error,
            error_description,
            ..
        }) => Err(MailError::Token(
            error_description
                .or(error)
                .unwrap_or_else(|| format!("HTTP {status}")),
        )),
        None => Err(MailError::Token(format!("HTTP {status}: unreadable token response"))),
    }
}

async fn try_send(
    html: &str,
    recipients: &[String],
    subject: &str,
    settings: &MailSettings,
    credentials: &MailCredentials,
) -> Result<(), MailError> {
    let credentials = validate(credentials)?;
    if recipients.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let http = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?;

    info!("Authenticating with Microsoft Graph API");
    let token = acquire_token(&http, settings, &credentials).await?;
    info!("Access token acquired");

    let request = SendMailRequest {
        message: Message {
            subject,
            body: Body {
                content_type: "HTML",
                content: html,
            },
            to_recipients: recipients
                .iter()
                .map(|address| Recipient {
                    email_address: EmailAddress { address },
                })
                .collect(),
        },
    };

    let endpoint = format!(
        "{}/v1.0/users/{}/sendMail",
        settings.graph_base.trim_end_matches('/'),
        urlencoding::encode(credentials.sender_email)
    );
    info!(%endpoint, "Sending via Graph API endpoint");
    let response = http
        .post(&endpoint)
        .bearer_auth(&token)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if status.as_u16() == settings.success_status {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(MailError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Send the rendered newsletter to `recipients`.
///
/// Returns `true` only when the mail endpoint answers with the configured
/// success status (202). Missing credentials, a failed token exchange, a
/// transport error or any other status all return `false`.
#[instrument(level = "info", skip(html, settings, credentials), fields(recipients = recipients.len()))]
pub async fn send_newsletter_email(
    html: &str,
    recipients: &[String],
    subject: &str,
    settings: &MailSettings,
    credentials: &MailCredentials,
) -> bool {
    match try_send(html, recipients, subject, settings, credentials).await {
        Ok(()) => {
            for recipient in recipients {
                info!(%recipient, status = settings.success_status, "Newsletter sent");
            }
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to send newsletter email");
            false
        }
    }
}

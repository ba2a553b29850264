//! Generative model interaction with a fixed backoff schedule.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait, one prompt in, one response out
//! - [`GeminiClient`]: calls the Gemini `generateContent` REST endpoint
//! - [`RetryAsk`]: decorator that retries "service overloaded" failures
//!
//! # Retry Strategy
//!
//! Only [`LlmError::Overloaded`] is retried. The delay before the n-th retry
//! is the n-th entry of a fixed schedule (default 1s, 2s, 4s), with the last
//! entry reused if the schedule runs out. There is no jitter. Any other
//! failure is returned immediately, and once the attempt bound is reached the
//! last failure is returned.

use crate::config::ModelSettings;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Failures of a single model call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The service reported it is overloaded; worth retrying.
    #[error("model overloaded (HTTP {status}): {message}")]
    Overloaded { status: u16, message: String },
    #[error("model API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode model response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("model response contained no text")]
    EmptyResponse,
}

impl LlmError {
    /// Whether this failure is the transient overload the retry loop handles.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, LlmError::Overloaded { .. })
    }
}

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, LlmError>;
}

/// Wrapper that retries overloaded failures of any [`AskAsync`] implementation
/// on a fixed delay schedule.
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Total attempts, including the first.
    max_attempts: usize,
    /// Delay before each retry, in order.
    delays: Vec<Duration>,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying LLM client to wrap
    /// * `max_attempts` - Total attempts including the first (at least 1)
    /// * `delays` - Delay before the first, second, ... retry
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = GeminiClient::new(&settings, &api_key)?;
    /// let api = RetryAsk::new(client, 3, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    /// ```
    pub fn new(inner: T, max_attempts: usize, delays: Vec<Duration>) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// Wrap `inner` with the attempt bound and schedule from `settings`.
    pub fn from_settings(inner: T, settings: &ModelSettings) -> Self {
        Self::new(inner, settings.max_attempts, settings.retry_delays())
    }

    /// Delay before retry number `retry` (0-based).
    fn delay_for(&self, retry: usize) -> Duration {
        self.delays
            .get(retry)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }
}

impl<T: fmt::Debug> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("inner", &self.inner)
            .field("max_attempts", &self.max_attempts)
            .field("delays", &self.delays)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            let e = match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            let attempt_dt = attempt_t0.elapsed();

            if !e.is_overloaded() {
                error!(
                    attempt,
                    elapsed_ms_attempt = attempt_dt.as_millis(),
                    error = %e,
                    "ask() failed with a non-retryable error"
                );
                return Err(e);
            }

            if attempt >= self.max_attempts {
                error!(
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis(),
                    error = %e,
                    "ask() exhausted retries"
                );
                return Err(e);
            }

            let delay = self.delay_for(attempt - 1);
            warn!(
                attempt,
                max = self.max_attempts,
                elapsed_ms_attempt = attempt_dt.as_millis(),
                ?delay,
                error = %e,
                "Model overloaded; backing off"
            );
            sleep(delay).await;
        }
    }
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(settings: &ModelSettings, api_key: &str) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.api_base.trim_end_matches('/'),
            settings.model
        );
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-success response into an [`LlmError`], classifying overloads.
fn classify_failure(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::SERVICE_UNAVAILABLE || message.to_lowercase().contains("overloaded") {
        LlmError::Overloaded {
            status: status.as_u16(),
            message,
        }
    } else {
        LlmError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

impl AskAsync for GeminiClient {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, LlmError> {
        let t0 = Instant::now();
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text }],
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            let e = classify_failure(status, &body);
            warn!(elapsed_ms = dt.as_millis(), error = %e, "API call failed");
            return Err(e);
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        let reply: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if reply.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(reply)
    }
}

/// Send `prompt` through `api`, logging the total time taken.
///
/// This is the entry point the pipeline uses for both the selection call
/// and the per-story summary calls. It adds no retries of its own; wrap the
/// client in [`RetryAsk`] for backoff.
#[instrument(level = "info", skip_all)]
pub async fn ask_logged<A>(api: &A, prompt: &str) -> Result<String, LlmError>
where
    A: AskAsync<Response = String>,
{
    let t0 = Instant::now();
    let res = api.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(reply) => info!(
            elapsed_ms_total = dt.as_millis(),
            reply_chars = reply.chars().count(),
            "Model call succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis(), error = %e, "Model call failed")
        }
    }
    res
}

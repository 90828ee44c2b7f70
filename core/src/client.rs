//! Remote classifier client (Anthropic Messages API).
//!
//! Explicitly constructed and passed down; one instance per pipeline run.
//! Supports pointing `api_base` at any compatible endpoint, including a
//! locally hosted one.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use regex_lite::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::config::{FilterConfig, MAX_OUTPUT_TOKENS};
use crate::errors::{FilterError, Result, truncate_chars};
use crate::prompt::render_prompt;

/// Anthropic API version header.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Total attempts per unit before a failure verdict is recorded.
pub const MAX_ATTEMPTS: usize = 3;

/// The classifier's decision for one content unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassifierVerdict {
    /// Missing field defaults to false, matching the permissive read the
    /// prompt asks for ("is_skill": true/false).
    #[serde(default)]
    pub is_skill: bool,
    #[serde(default)]
    pub reason: String,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Error response wrapper.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

/// Classifier client over the Messages API.
pub struct ClassifierClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    retry_initial_delay: Duration,
}

impl ClassifierClient {
    /// Build a client from the run configuration.
    ///
    /// The credential comes from `config.api_key`, falling back to the
    /// `ANTHROPIC_API_KEY` environment variable.
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                FilterError::Config("no API key: set ANTHROPIC_API_KEY or --api-key".to_string())
            })?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            retry_initial_delay: config.retry_initial_delay,
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| FilterError::Config("API key is not a valid header value".to_string()))?,
        );
        Ok(headers)
    }

    /// Map a non-success response to [`FilterError::Api`], preferring the
    /// structured error body when it parses.
    pub(crate) async fn error_from_response(response: reqwest::Response) -> FilterError {
        let status = response.status().as_u16();
        let error_text = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(&error_text) {
            return FilterError::Api {
                status,
                message: parsed.error.message,
                error_type: Some(parsed.error.error_type),
            };
        }
        FilterError::Api {
            status,
            message: error_text,
            error_type: None,
        }
    }

    /// One classification round trip, no retry.
    async fn classify_once(&self, content: &str) -> Result<ClassifierVerdict> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{"role": "user", "content": render_prompt(content)}],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let message: MessageResponse = response.json().await?;
        let text = message
            .content
            .first()
            .and_then(|block| block.text.as_deref())
            .ok_or_else(|| FilterError::Parse("response has no text content".to_string()))?;
        parse_verdict(text)
    }

    /// Classify one unit, retrying transport, API, and parse failures with
    /// increasing delay (2s, 4s by default) before giving up.
    pub async fn classify(&self, content: &str) -> Result<ClassifierVerdict> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_initial_delay)
            .with_factor(2.0)
            .with_max_times(MAX_ATTEMPTS - 1);

        (|| self.classify_once(content))
            .retry(backoff)
            .notify(|err: &FilterError, delay: Duration| {
                tracing::warn!(error = %err, retry_in = ?delay, "classifier call failed, retrying");
            })
            .await
    }
}

/// Parse the classifier's reply.
///
/// Tries, in order: the whole reply as a JSON object; a fenced ```json
/// block; a best-effort scan for an object containing `"is_skill"`. All
/// three failing is a parse failure (retried like any other failure, and
/// never cached).
pub fn parse_verdict(text: &str) -> Result<ClassifierVerdict> {
    let text = text.trim();

    if let Ok(verdict) = serde_json::from_str::<ClassifierVerdict>(text) {
        return Ok(verdict);
    }

    if let Some(captures) = compile(r"```json\s*(\{[\s\S]*?\})\s*```")?.captures(text)
        && let Some(block) = captures.get(1)
        && let Ok(verdict) = serde_json::from_str::<ClassifierVerdict>(block.as_str())
    {
        return Ok(verdict);
    }

    if let Some(object) = compile(r#"\{[\s\S]*"is_skill"[\s\S]*\}"#)?.find(text)
        && let Ok(verdict) = serde_json::from_str::<ClassifierVerdict>(object.as_str())
    {
        return Ok(verdict);
    }

    Err(FilterError::Parse(format!(
        "could not parse JSON from response: {}",
        truncate_chars(text, 200)
    )))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| FilterError::Parse(format!("bad pattern: {err}")))
}

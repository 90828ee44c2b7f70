//! Message Batches variant of the classifier: submit, poll, stream results.
//!
//! Trades latency for the batch-pricing discount. Each submitted chunk is
//! polled to completion before the next chunk goes out; correctness does
//! not depend on completion order within a chunk.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::client::{ClassifierClient, ClassifierVerdict, ContentBlock, parse_verdict};
use crate::config::MAX_OUTPUT_TOKENS;
use crate::errors::{FilterError, Result};
use crate::plan::PendingUnit;
use crate::prompt::render_prompt;

/// A message batch as reported by the API.
#[derive(Debug, Deserialize)]
pub struct MessageBatch {
    pub id: String,
    pub processing_status: String,
    #[serde(default)]
    pub request_counts: RequestCounts,
    #[serde(default)]
    pub results_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub canceled: u64,
    #[serde(default)]
    pub expired: u64,
}

impl RequestCounts {
    fn finished(&self) -> u64 {
        self.succeeded + self.errored + self.canceled + self.expired
    }
}

/// Terminal outcome for one submitted unit, correlated by `custom_id`
/// (the unit's prompt hash). `Err` carries the verdict reason to record.
#[derive(Debug)]
pub struct BatchOutcome {
    pub custom_id: String,
    pub verdict: std::result::Result<ClassifierVerdict, String>,
}

#[derive(Debug, Deserialize)]
struct BatchResultLine {
    custom_id: String,
    result: BatchResult,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    #[serde(rename = "type")]
    result_type: String,
    #[serde(default)]
    message: Option<BatchMessage>,
}

#[derive(Debug, Deserialize)]
struct BatchMessage {
    content: Vec<ContentBlock>,
}

impl ClassifierClient {
    /// Submit one packed chunk as a message batch.
    pub async fn submit_batch(&self, units: &[PendingUnit]) -> Result<MessageBatch> {
        let requests: Vec<serde_json::Value> = units
            .iter()
            .map(|unit| {
                json!({
                    "custom_id": unit.cache_key,
                    "params": {
                        "model": self.model(),
                        "max_tokens": MAX_OUTPUT_TOKENS,
                        "messages": [{"role": "user", "content": render_prompt(&unit.content)}],
                    }
                })
            })
            .collect();

        let response = self
            .http()
            .post(format!("{}/v1/messages/batches", self.api_base()))
            .headers(self.default_headers()?)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch the batch's current status.
    pub async fn retrieve_batch(&self, id: &str) -> Result<MessageBatch> {
        let response = self
            .http()
            .get(format!("{}/v1/messages/batches/{id}", self.api_base()))
            .headers(self.default_headers()?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Poll on a fixed interval until the batch reaches its terminal
    /// status. Batches can take arbitrarily long; only the interval is
    /// bounded.
    pub async fn poll_batch(
        &self,
        id: &str,
        interval: Duration,
        total: usize,
    ) -> Result<MessageBatch> {
        loop {
            let batch = self.retrieve_batch(id).await?;
            if batch.processing_status == "ended" {
                return Ok(batch);
            }
            let counts = batch.request_counts;
            tracing::info!(
                batch = id,
                done = counts.finished(),
                total,
                succeeded = counts.succeeded,
                errored = counts.errored,
                "batch in progress"
            );
            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch and decode the batch's JSONL result stream.
    pub async fn batch_results(&self, batch: &MessageBatch) -> Result<Vec<BatchOutcome>> {
        let url = match batch.results_url.as_deref() {
            Some(url) if url.starts_with("http") => url.to_string(),
            Some(path) => format!("{}{path}", self.api_base()),
            None => format!(
                "{}/v1/messages/batches/{}/results",
                self.api_base(),
                batch.id
            ),
        };

        let response = self
            .http()
            .get(url)
            .headers(self.default_headers()?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body = response.text().await?;
        let mut outcomes = Vec::new();
        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let line: BatchResultLine = serde_json::from_str(line)
                .map_err(|err| FilterError::Parse(format!("bad batch result line: {err}")))?;
            outcomes.push(BatchOutcome {
                verdict: decode_result(&line.result),
                custom_id: line.custom_id,
            });
        }
        Ok(outcomes)
    }
}

/// Map one item result to a verdict or the failure reason to record.
/// Non-succeeded terminal states are failures named after the state; they
/// are never cached, so a later run retries them.
fn decode_result(result: &BatchResult) -> std::result::Result<ClassifierVerdict, String> {
    if result.result_type != "succeeded" {
        return Err(format!("API error: {}", result.result_type));
    }
    let text = result
        .message
        .as_ref()
        .and_then(|message| message.content.first())
        .and_then(|block| block.text.as_deref())
        .ok_or_else(|| "Parse error: succeeded result has no text".to_string())?;
    parse_verdict(text).map_err(|err| err.verdict_reason())
}

//! Answer generation against the Google Gemini API.
//!
//! Two paths over the same request shape:
//! - streaming via `streamGenerateContent?alt=sse`, pushing one
//!   [`FragmentEvent::Fragment`] per non-empty text chunk,
//! - buffered via `generateContent` for the non-streaming HTTP fallback.
//!
//! Auth is a `?key=` query parameter. Failure mid-stream is signaled by an
//! `Err` return, distinct from normal exhaustion (which sends
//! [`FragmentEvent::Done`] before returning `Ok`).

use crate::config::LlmConfig;
use crate::error::GenerateError;
use crate::types::{FragmentEvent, Query, Source};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Produces an incrementally generated answer grounded in ranked sources.
///
/// One-shot per call, finite, and may fail at any point mid-sequence.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Stream the answer as ordered fragments on `tx`.
    ///
    /// Sends a `Fragment` per non-empty chunk, then `Done` on normal
    /// completion. Returns `Err` on failure (including mid-stream, after
    /// partial output) without sending `Done`.
    async fn complete_streaming(
        &self,
        query: &Query,
        sources: &[Source],
        tx: mpsc::Sender<FragmentEvent>,
    ) -> Result<(), GenerateError>;

    /// Generate the full answer as one buffered string.
    async fn complete(&self, query: &Query, sources: &[Source]) -> Result<String, GenerateError>;
}

/// Google Gemini answer generator.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiGenerator {
    /// Create a generator from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns [`GenerateError::Unavailable`] if it
    /// is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, GenerateError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GenerateError::Unavailable {
                var: config.api_key_env.clone(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerateError::ApiRequest {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the JSON request body: one user turn carrying the grounding
    /// prompt, plus generation parameters.
    fn build_request_body(&self, query: &Query, sources: &[Source]) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": build_prompt(query, sources)}],
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
            },
        })
    }

    /// Build the endpoint URL for a Gemini API call.
    fn endpoint_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }

    /// Map an HTTP status code to the appropriate `GenerateError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> GenerateError {
        match status.as_u16() {
            401 | 403 => GenerateError::AuthFailed,
            429 => GenerateError::RateLimited {
                retry_after_secs: 30,
            },
            _ => GenerateError::ApiRequest {
                message: format!("HTTP {} from model provider: {}", status, body_text),
            },
        }
    }

    /// Pull the non-empty text chunks out of one response/stream payload.
    fn extract_fragments(data: &Value) -> Vec<String> {
        let mut fragments = Vec::new();
        if let Some(parts) = data["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str())
                    && !text.is_empty()
                {
                    fragments.push(text.to_string());
                }
            }
        }
        fragments
    }

    /// Parse a full (non-streaming) response into the answer text.
    fn parse_response(body: &Value) -> Result<String, GenerateError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| GenerateError::ResponseParse {
                message: "missing 'candidates' array in response".to_string(),
            })?;

        if candidates.is_empty() {
            return Err(GenerateError::ResponseParse {
                message: "empty 'candidates' array in response".to_string(),
            });
        }

        Ok(Self::extract_fragments(body).concat())
    }

    /// Parse one SSE line, forwarding any text chunks as fragments.
    async fn process_sse_line(line: &str, tx: &mpsc::Sender<FragmentEvent>) {
        let Some(data_str) = line.strip_prefix("data: ") else {
            return;
        };
        match serde_json::from_str::<Value>(data_str) {
            Ok(data) => {
                for fragment in Self::extract_fragments(&data) {
                    let _ = tx.send(FragmentEvent::Fragment(fragment)).await;
                }
            }
            Err(e) => warn!(error = %e, "failed to parse SSE chunk"),
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn complete_streaming(
        &self,
        query: &Query,
        sources: &[Source],
        tx: mpsc::Sender<FragmentEvent>,
    ) -> Result<(), GenerateError> {
        let body = self.build_request_body(query, sources);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = self.model.as_str(), "sending streaming generation request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::ApiRequest {
                message: format!("streaming request to model provider failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        // Re-assemble SSE lines from the raw byte stream.
        let mut byte_stream = response.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| GenerateError::Streaming {
                message: format!("failed to read streaming chunk: {}", e),
            })?;

            line_buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = line_buffer.find('\n') {
                let line = line_buffer[..newline_pos].trim().to_string();
                line_buffer = line_buffer[newline_pos + 1..].to_string();
                Self::process_sse_line(&line, &tx).await;
            }
        }

        // Whatever is left after the stream closes may be a final event.
        let remaining = line_buffer.trim().to_string();
        if !remaining.is_empty() {
            Self::process_sse_line(&remaining, &tx).await;
        }

        let _ = tx.send(FragmentEvent::Done).await;
        Ok(())
    }

    async fn complete(&self, query: &Query, sources: &[Source]) -> Result<String, GenerateError> {
        let body = self.build_request_body(query, sources);
        let url = self.endpoint_url("generateContent");

        debug!(model = self.model.as_str(), "sending generation request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::ApiRequest {
                message: format!("request to model provider failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| GenerateError::ResponseParse {
                message: format!("failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| GenerateError::ResponseParse {
                message: format!("invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }
}

/// Assemble the grounding prompt: each ranked source numbered with its URL
/// and content, followed by the query and the answering instruction.
fn build_prompt(query: &Query, sources: &[Source]) -> String {
    let context = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Source {} ({}):\n{}", i + 1, s.url, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context from web search:\n{}\n\nQuery: {}\n\nProvide a comprehensive, factual, well-cited answer.",
        context, query
    )
}

//! Web source retrieval.
//!
//! Wraps a Tavily-style JSON search API and, optionally, a per-result page
//! fetch that extracts readable text to replace the provider's short
//! snippet. Every failure inside this module is contained: a failed page
//! fetch falls back to the snippet, and a failed search call surfaces as a
//! typed [`SearchError`] that the orchestrator degrades to an empty set.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::{Query, Source};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("Scry/", env!("CARGO_PKG_VERSION"));

/// Page text longer than this is truncated before it enters the prompt.
const MAX_PAGE_CHARS: usize = 8_000;

/// Retrieves candidate sources for a query.
///
/// May block on network I/O and may fail; callers are expected to treat a
/// failure as "no sources", not as a fatal error.
#[async_trait]
pub trait SourceRetriever: Send + Sync {
    async fn search(&self, query: &Query) -> Result<Vec<Source>, SearchError>;
}

/// Search client backed by a Tavily-style `POST /search` JSON API.
pub struct WebSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_results: usize,
    fetch_page_content: bool,
}

impl std::fmt::Debug for WebSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchClient")
            .field("base_url", &self.base_url)
            .field("max_results", &self.max_results)
            .field("fetch_page_content", &self.fetch_page_content)
            .finish()
    }
}

impl WebSearchClient {
    /// Create a client from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns [`SearchError::Unavailable`] if it is
    /// not set, so the caller can run without a retriever instead of
    /// failing the process.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SearchError::Unavailable {
                var: config.api_key_env.clone(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| SearchError::ApiRequest {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            max_results: config.max_results,
            fetch_page_content: config.fetch_page_content,
        })
    }

    /// Call the search API and parse its result list.
    async fn search_api(&self, query: &Query) -> Result<Vec<Source>, SearchError> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query.as_str(),
            "max_results": self.max_results,
        });

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::ApiRequest {
                message: format!("request to search provider failed: {}", e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::ResponseParse {
                message: format!("failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(SearchError::ApiRequest {
                message: format!("HTTP {} from search provider: {}", status, preview(&text)),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| SearchError::ResponseParse {
            message: format!("invalid JSON in response: {}", e),
        })?;

        Ok(Self::parse_search_response(&json))
    }

    /// Extract `{title, url, content}` triples from a search response.
    ///
    /// Missing fields become empty strings; a missing or malformed
    /// `results` array yields an empty set.
    fn parse_search_response(body: &Value) -> Vec<Source> {
        body["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|r| Source {
                        title: r["title"].as_str().unwrap_or("").to_string(),
                        url: r["url"].as_str().unwrap_or("").to_string(),
                        content: r["content"].as_str().unwrap_or("").to_string(),
                        relevance_score: None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fetch one result URL and extract its readable text.
    ///
    /// Any failure returns `None` and the caller keeps the API snippet.
    async fn fetch_page_text(&self, url: &str) -> Option<String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return None;
        }

        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "page fetch returned non-success");
            return None;
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await.ok()?;
        let text = if content_type.contains("text/html") || content_type.contains("application/xhtml")
        {
            extract_text_from_html(&body)
        } else {
            body
        };

        let text = truncate_chars(&text, MAX_PAGE_CHARS);
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl SourceRetriever for WebSearchClient {
    async fn search(&self, query: &Query) -> Result<Vec<Source>, SearchError> {
        let mut sources = self.search_api(query).await?;

        if self.fetch_page_content {
            let fetches = sources.iter().map(|s| self.fetch_page_text(&s.url));
            let texts = futures::future::join_all(fetches).await;
            for (source, text) in sources.iter_mut().zip(texts) {
                match text {
                    Some(text) => source.content = text,
                    None => warn!(url = source.url.as_str(), "content extraction failed, keeping snippet"),
                }
            }
        }

        debug!(count = sources.len(), "retrieved sources");
        Ok(sources)
    }
}

/// Block-level tags that become line breaks during text extraction.
const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr",
];

/// Strip HTML down to readable text.
///
/// Tags are dropped, `<script>` and `<style>` bodies are skipped entirely,
/// block-level tags become line breaks, and common entities are decoded.
/// Not a full parser — good enough for feeding page text into a prompt.
fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut skipping = false;
    let mut tag_name = String::new();
    let mut name_done = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_name.clear();
                name_done = false;
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag_name.to_lowercase();
                let bare = name.trim_start_matches('/').trim_end_matches('/');
                match bare {
                    "script" | "style" => skipping = !name.starts_with('/'),
                    _ if BLOCK_TAGS.contains(&bare) => text.push('\n'),
                    _ => {}
                }
            }
            _ if in_tag => {
                // Only the leading identifier matters; attributes are noise.
                if !name_done {
                    if ch.is_alphanumeric() || ch == '/' {
                        tag_name.push(ch);
                    } else {
                        name_done = true;
                    }
                }
            }
            _ if skipping => {}
            _ => text.push(ch),
        }
    }

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    // Collapse the whitespace left behind by dropped markup.
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to a character count without splitting a multi-byte boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// First 200 characters of an error body, for log-friendly messages.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

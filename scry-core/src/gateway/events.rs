//! Gateway message protocol.
//!
//! Outbound messages are tagged objects (`{"type": "...", ...}`). Within
//! one turn the order is always `search_result` -> `start` -> zero or more
//! `content` -> (`end` | `error`); `ping` only ever appears between turns.

use crate::error::QueryError;
use crate::types::{Query, Source};
use serde::{Deserialize, Serialize};

/// Inbound message on the chat socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub query: Option<String>,
}

impl ChatMessage {
    /// Parse a raw inbound payload and validate its query.
    ///
    /// Rejects non-JSON payloads and missing/blank queries before any
    /// pipeline stage can run.
    pub fn parse_query(raw: &str) -> Result<Query, QueryError> {
        let msg: ChatMessage =
            serde_json::from_str(raw).map_err(|e| QueryError::Malformed {
                message: e.to_string(),
            })?;
        Query::parse(msg.query.as_deref().unwrap_or_default())
    }
}

/// Body of the non-streaming `POST /chat` fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    pub query: String,
}

/// Response of the non-streaming `POST /chat` fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Outbound messages on the chat socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnMessage {
    /// Keep-alive while the connection is idle.
    Ping,
    /// Terminates the current turn only, never the connection.
    Error { message: String },
    /// The ranked source set; always precedes generation, even when empty.
    SearchResult { data: Vec<Source> },
    /// Generation is beginning.
    Start,
    /// One answer fragment, in generation order.
    Content { data: String },
    /// Generation completed normally.
    End,
}

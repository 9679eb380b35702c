//! Per-connection turn orchestration.
//!
//! A [`Session`] drives the retrieve -> rank -> generate pipeline for one
//! query at a time and translates the stages into the outbound protocol
//! sequence. Failure isolation per stage:
//! - retrieval/ranking failures degrade to an empty source set, the turn
//!   continues and still produces an answer;
//! - generation failures end the turn with an `error` message, keeping any
//!   partial output already sent;
//! - only a transport failure ([`SinkClosed`]) ends the connection.
//!
//! Ordering is structural: `search_result` is sent before `start`, every
//! `content` is pulled from the fragment channel in generation order, and
//! a turn ends with exactly one of `end` or `error`.

use super::events::{ChatMessage, TurnMessage};
use crate::collaborators::Collaborators;
use crate::types::FragmentEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// The client transport is gone; no further messages can be delivered.
#[derive(Debug, thiserror::Error)]
#[error("client transport closed")]
pub struct SinkClosed;

/// Outbound side of a connection.
///
/// The production implementation wraps a WebSocket; tests use an in-memory
/// vector. All of a connection's messages go through one sink, which keeps
/// them strictly serialized.
#[async_trait]
pub trait TurnSink: Send {
    async fn send(&mut self, msg: TurnMessage) -> Result<(), SinkClosed>;
}

/// How a single turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Full answer streamed, `end` sent.
    Completed,
    /// The query was rejected before any stage ran.
    Rejected,
    /// Generation failed mid-stream, `error` sent.
    Failed,
}

/// Orchestrates the pipeline for one connection.
///
/// Holds no per-turn state: each query is processed independently, so the
/// only thing a connection carries across turns is the open socket itself.
#[derive(Debug, Clone)]
pub struct Session {
    collaborators: Arc<Collaborators>,
}

impl Session {
    pub fn new(collaborators: Arc<Collaborators>) -> Self {
        Self { collaborators }
    }

    /// Process one inbound payload as a complete turn.
    ///
    /// Returns `Err(SinkClosed)` only when the transport failed; every
    /// other failure is reported to the client in-band and the connection
    /// stays usable for the next query.
    pub async fn process_turn<S: TurnSink>(
        &self,
        raw: &str,
        sink: &mut S,
    ) -> Result<TurnOutcome, SinkClosed> {
        // Validating: reject before any stage is invoked.
        let query = match ChatMessage::parse_query(raw) {
            Ok(query) => query,
            Err(e) => {
                sink.send(TurnMessage::Error {
                    message: e.to_string(),
                })
                .await?;
                return Ok(TurnOutcome::Rejected);
            }
        };

        // Retrieving + Ranking, off this task so the connection stays
        // responsive. If the client disconnects mid-search the handle is
        // dropped with the session and the result is simply discarded.
        let sources = {
            let collaborators = Arc::clone(&self.collaborators);
            let q = query.clone();
            match tokio::spawn(async move { collaborators.retrieve_and_rank(&q).await }).await {
                Ok(sources) => sources,
                Err(e) => {
                    warn!(error = %e, "retrieval task failed, continuing without sources");
                    Vec::new()
                }
            }
        };

        // Sources always reach the client before any generated content.
        sink.send(TurnMessage::SearchResult {
            data: sources.clone(),
        })
        .await?;
        sink.send(TurnMessage::Start).await?;

        // Generating: forward fragments in generation order until the
        // stream terminates one way or the other.
        let mut rx = self.collaborators.stream_answer(&query, &sources);
        loop {
            match rx.recv().await {
                Some(FragmentEvent::Fragment(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    sink.send(TurnMessage::Content { data: text }).await?;
                }
                Some(FragmentEvent::Done) => {
                    sink.send(TurnMessage::End).await?;
                    return Ok(TurnOutcome::Completed);
                }
                Some(FragmentEvent::Error(message)) => {
                    sink.send(TurnMessage::Error { message }).await?;
                    return Ok(TurnOutcome::Failed);
                }
                // Producer vanished without a terminal event.
                None => {
                    sink.send(TurnMessage::Error {
                        message: "generation stream ended unexpectedly".to_string(),
                    })
                    .await?;
                    return Ok(TurnOutcome::Failed);
                }
            }
        }
    }
}

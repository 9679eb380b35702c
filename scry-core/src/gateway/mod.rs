//! # Chat Gateway
//!
//! The client-facing surface: a WebSocket endpoint (`/ws/chat`) streaming
//! one ordered message sequence per query, a non-streaming HTTP fallback
//! (`/chat`), and a liveness endpoint (`/healthz`) reporting collaborator
//! availability. The per-connection protocol is driven by [`Session`].

mod events;
mod server;
mod session;

pub use events::{ChatBody, ChatMessage, ChatResponse, TurnMessage};
pub use server::{router, run, AppState};
pub use session::{Session, SinkClosed, TurnOutcome, TurnSink};

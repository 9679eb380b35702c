//! # scry-core
//!
//! Core library for Scry, a backend that answers a user query by retrieving
//! web search results, ranking them by relevance, and streaming a
//! model-generated answer grounded in those results over a persistent
//! WebSocket connection (with a non-streaming HTTP fallback).
//!
//! The pipeline is built from three collaborators behind trait seams —
//! [`retrieve::SourceRetriever`], [`rank::Ranker`], and
//! [`generate::AnswerGenerator`] — orchestrated per connection by
//! [`gateway::Session`]. Each collaborator is an optional, independently
//! initialized capability: a missing credential degrades that stage to a
//! documented fallback instead of failing the process.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generate;
pub mod rank;
pub mod retrieve;
pub mod types;

pub use collaborators::Collaborators;
pub use config::ScryConfig;
pub use types::{FragmentEvent, Query, Source};

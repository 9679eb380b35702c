//! Core data types shared across the pipeline.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};

/// A validated user query: non-empty after trimming.
///
/// Invalid input is rejected here, before any pipeline stage runs, so the
/// retriever, ranker, and generator never see an empty query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validate and normalize raw query text.
    ///
    /// Returns [`QueryError::Empty`] if the input is empty or
    /// whitespace-only; otherwise the trimmed text is kept.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One retrieved web document surrogate.
///
/// Created by the retriever with no score; `relevance_score` is assigned
/// by the ranker and is the only field that is ever mutated. Duplicates
/// are not deduplicated — there is no identity beyond structural equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl Source {
    /// Create an unscored source.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            relevance_score: None,
        }
    }
}

/// Events produced by an answer-generation stream.
///
/// A well-behaved producer sends zero or more `Fragment`s followed by
/// exactly one terminal event. `Error` is distinct from normal exhaustion:
/// it may arrive after partial output, and the fragments already delivered
/// remain valid.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentEvent {
    /// One non-empty chunk of generated answer text.
    Fragment(String),
    /// The generator finished normally.
    Done,
    /// The generator failed, possibly mid-stream.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    #[test]
    fn test_query_parse_trims() {
        let query = Query::parse("  rust async  ").unwrap();
        assert_eq!(query.as_str(), "rust async");
        assert_eq!(query.to_string(), "rust async");
    }

    #[test]
    fn test_query_parse_rejects_empty() {
        assert!(matches!(Query::parse(""), Err(QueryError::Empty)));
        assert!(matches!(Query::parse("   \t\n"), Err(QueryError::Empty)));
    }

    #[test]
    fn test_source_serialization_without_score() {
        let source = Source::new("Rust Book", "https://doc.rust-lang.org/book/", "ownership");
        let json = serde_json::to_string(&source).unwrap();
        // Unscored sources omit the field entirely.
        assert!(!json.contains("relevance_score"));

        let restored: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, source);
    }

    #[test]
    fn test_source_serialization_with_score() {
        let mut source = Source::new("Rust Book", "https://doc.rust-lang.org/book/", "ownership");
        source.relevance_score = Some(6.0);
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("\"relevance_score\":6.0"));

        let restored: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.relevance_score, Some(6.0));
    }

    #[test]
    fn test_source_structural_equality() {
        let a = Source::new("t", "u", "c");
        let b = Source::new("t", "u", "c");
        assert_eq!(a, b);
    }
}

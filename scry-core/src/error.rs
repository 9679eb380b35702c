//! Error types for the Scry pipeline.
//!
//! Uses `thiserror` for structured error variants, one enum per stage.
//! The propagation policy is enforced by the types: stage-local failures
//! (retrieval) degrade to empty results, stream-local failures (generation)
//! end the current turn, and only a transport failure closes a connection.

/// Errors from validating an inbound query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query was missing or blank after trimming.
    #[error("Empty query")]
    Empty,

    /// The inbound payload was not a structured message.
    #[error("Invalid message: {message}")]
    Malformed { message: String },
}

/// Errors from the source retriever.
///
/// Never fatal to a turn: the orchestrator degrades any of these to an
/// empty source set.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search provider not configured (env var '{var}' not set)")]
    Unavailable { var: String },

    #[error("search request failed: {message}")]
    ApiRequest { message: String },

    #[error("search response parse error: {message}")]
    ResponseParse { message: String },
}

/// Errors from the answer generator.
///
/// A failure here ends the current turn (reported to the client as an
/// `error` message, or HTTP 500 on the fallback path) but never the
/// connection or the process.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("model provider not configured (env var '{var}' not set)")]
    Unavailable { var: String },

    #[error("model request failed: {message}")]
    ApiRequest { message: String },

    #[error("model response parse error: {message}")]
    ResponseParse { message: String },

    #[error("streaming error: {message}")]
    Streaming { message: String },

    #[error("authentication failed for model provider")]
    AuthFailed,

    #[error("rate limited by model provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        assert_eq!(QueryError::Empty.to_string(), "Empty query");

        let err = QueryError::Malformed {
            message: "expected value at line 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid message: expected value at line 1"
        );
    }

    #[test]
    fn test_search_error_display() {
        let err = SearchError::Unavailable {
            var: "TAVILY_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "search provider not configured (env var 'TAVILY_API_KEY' not set)"
        );

        let err = SearchError::ApiRequest {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "search request failed: connection refused");
    }

    #[test]
    fn test_generate_error_display() {
        let err = GenerateError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "rate limited by model provider, retry after 30s"
        );

        let err = GenerateError::Streaming {
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "streaming error: connection reset");
    }
}

//! Process-wide collaborator capabilities.
//!
//! Each external collaborator (search provider, model provider) is an
//! independently initialized, independently optional capability. A missing
//! credential disables that capability with a documented fallback instead
//! of failing the process; the ranker is pure and always present. The
//! whole set is passed explicitly into the gateway — no globals.

use crate::config::ScryConfig;
use crate::error::GenerateError;
use crate::generate::{AnswerGenerator, GeminiGenerator};
use crate::rank::Ranker;
use crate::retrieve::{SourceRetriever, WebSearchClient};
use crate::types::{FragmentEvent, Query, Source};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Answer returned when no model provider is configured.
pub const FALLBACK_ANSWER: &str = "Answer generation is unavailable: no model provider is \
     configured. Set the model API key to enable generated answers.";

/// The pipeline's collaborators, plus the degrade-not-crash policies that
/// bind them together.
pub struct Collaborators {
    retriever: Option<Arc<dyn SourceRetriever>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    ranker: Ranker,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("retriever", &self.retriever.is_some())
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

impl Collaborators {
    /// Wire up explicit collaborator instances.
    pub fn new(
        retriever: Option<Arc<dyn SourceRetriever>>,
        generator: Option<Arc<dyn AnswerGenerator>>,
        ranker: Ranker,
    ) -> Self {
        Self {
            retriever,
            generator,
            ranker,
        }
    }

    /// Best-effort initialization from configuration.
    ///
    /// Each capability that cannot be constructed (typically a missing API
    /// key) is logged and left absent; the server still starts and serves
    /// degraded turns.
    pub fn from_config(config: &ScryConfig) -> Self {
        let retriever: Option<Arc<dyn SourceRetriever>> = match WebSearchClient::new(&config.search)
        {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "web search disabled");
                None
            }
        };

        let generator: Option<Arc<dyn AnswerGenerator>> = match GeminiGenerator::new(&config.llm) {
            Ok(generator) => Some(Arc::new(generator)),
            Err(e) => {
                warn!(error = %e, "answer generation disabled");
                None
            }
        };

        Self {
            retriever,
            generator,
            ranker: Ranker::new(config.ranking.clone()),
        }
    }

    pub fn has_retriever(&self) -> bool {
        self.retriever.is_some()
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// Run the retrieval and ranking stages for one query.
    ///
    /// Retriever failure or absence degrades to an empty set. The ranked
    /// result is capped to the configured `max_sources` presentation
    /// limit; the ranker itself never drops sources.
    pub async fn retrieve_and_rank(&self, query: &Query) -> Vec<Source> {
        let retrieved = match &self.retriever {
            Some(retriever) => match retriever.search(query).await {
                Ok(sources) => sources,
                Err(e) => {
                    warn!(error = %e, "source retrieval failed, continuing without sources");
                    Vec::new()
                }
            },
            None => {
                debug!("no search provider configured, continuing without sources");
                Vec::new()
            }
        };

        let mut ranked = self.ranker.rank(query.as_str(), retrieved);
        ranked.truncate(self.ranker.config().max_sources);
        ranked
    }

    /// Start answer generation for one turn, returning the fragment stream.
    ///
    /// A dedicated task drives the generator so the caller never blocks on
    /// model I/O directly; generator failure is delivered in-band as
    /// [`FragmentEvent::Error`]. If the caller stops pulling (client
    /// disconnect), the task's sends fail silently and it winds down on
    /// its own.
    pub fn stream_answer(&self, query: &Query, sources: &[Source]) -> mpsc::Receiver<FragmentEvent> {
        let (tx, rx) = mpsc::channel(32);

        match &self.generator {
            Some(generator) => {
                let generator = Arc::clone(generator);
                let query = query.clone();
                let sources = sources.to_vec();
                tokio::spawn(async move {
                    if let Err(e) = generator.complete_streaming(&query, &sources, tx.clone()).await
                    {
                        warn!(error = %e, "answer generation failed");
                        let _ = tx.send(FragmentEvent::Error(e.to_string())).await;
                    }
                });
            }
            None => {
                tokio::spawn(async move {
                    let _ = tx
                        .send(FragmentEvent::Fragment(FALLBACK_ANSWER.to_string()))
                        .await;
                    let _ = tx.send(FragmentEvent::Done).await;
                });
            }
        }

        rx
    }

    /// Generate the full answer as one buffered string (non-streaming
    /// fallback path). An absent generator yields the documented fallback
    /// answer, keeping the two paths content-equivalent.
    pub async fn answer(&self, query: &Query, sources: &[Source]) -> Result<String, GenerateError> {
        match &self.generator {
            Some(generator) => generator.complete(query, sources).await,
            None => Ok(FALLBACK_ANSWER.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankingConfig;
    use crate::error::SearchError;
    use async_trait::async_trait;

    struct StubRetriever {
        sources: Vec<Source>,
        fail: bool,
    }

    #[async_trait]
    impl SourceRetriever for StubRetriever {
        async fn search(&self, _query: &Query) -> Result<Vec<Source>, SearchError> {
            if self.fail {
                Err(SearchError::ApiRequest {
                    message: "provider down".into(),
                })
            } else {
                Ok(self.sources.clone())
            }
        }
    }

    struct StubGenerator {
        fragments: Vec<String>,
        fail: bool,
    }

    #[async_trait]
    impl AnswerGenerator for StubGenerator {
        async fn complete_streaming(
            &self,
            _query: &Query,
            _sources: &[Source],
            tx: mpsc::Sender<FragmentEvent>,
        ) -> Result<(), GenerateError> {
            for fragment in &self.fragments {
                let _ = tx.send(FragmentEvent::Fragment(fragment.clone())).await;
            }
            if self.fail {
                return Err(GenerateError::Streaming {
                    message: "model connection reset".into(),
                });
            }
            let _ = tx.send(FragmentEvent::Done).await;
            Ok(())
        }

        async fn complete(
            &self,
            _query: &Query,
            _sources: &[Source],
        ) -> Result<String, GenerateError> {
            if self.fail {
                return Err(GenerateError::Streaming {
                    message: "model connection reset".into(),
                });
            }
            Ok(self.fragments.concat())
        }
    }

    fn query() -> Query {
        Query::parse("rust async").unwrap()
    }

    fn collaborators(
        retriever: Option<Arc<dyn SourceRetriever>>,
        generator: Option<Arc<dyn AnswerGenerator>>,
    ) -> Collaborators {
        Collaborators::new(retriever, generator, Ranker::new(RankingConfig::default()))
    }

    async fn drain(mut rx: mpsc::Receiver<FragmentEvent>) -> Vec<FragmentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_retrieve_and_rank_without_retriever() {
        let collabs = collaborators(None, None);
        assert!(collabs.retrieve_and_rank(&query()).await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_and_rank_degrades_on_failure() {
        let retriever: Arc<dyn SourceRetriever> = Arc::new(StubRetriever {
            sources: vec![],
            fail: true,
        });
        let collabs = collaborators(Some(retriever), None);
        assert!(collabs.retrieve_and_rank(&query()).await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_and_rank_scores_and_caps() {
        let sources: Vec<Source> = (0..8)
            .map(|i| Source::new(format!("page {i}"), format!("https://example.com/{i}"), "rust"))
            .collect();
        let retriever: Arc<dyn SourceRetriever> = Arc::new(StubRetriever {
            sources,
            fail: false,
        });
        let collabs = collaborators(Some(retriever), None);

        let ranked = collabs.retrieve_and_rank(&query()).await;
        // Capped to the presentation limit, every element scored.
        assert_eq!(ranked.len(), 5);
        assert!(ranked.iter().all(|s| s.relevance_score.is_some()));
    }

    #[tokio::test]
    async fn test_answer_fallback_without_generator() {
        let collabs = collaborators(None, None);
        let answer = collabs.answer(&query(), &[]).await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_stream_answer_fallback_without_generator() {
        let collabs = collaborators(None, None);
        let events = drain(collabs.stream_answer(&query(), &[])).await;
        assert_eq!(
            events,
            vec![
                FragmentEvent::Fragment(FALLBACK_ANSWER.to_string()),
                FragmentEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_answer_happy_path() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(StubGenerator {
            fragments: vec!["Hello, ".into(), "world".into()],
            fail: false,
        });
        let collabs = collaborators(None, Some(generator));

        let events = drain(collabs.stream_answer(&query(), &[])).await;
        assert_eq!(
            events,
            vec![
                FragmentEvent::Fragment("Hello, ".into()),
                FragmentEvent::Fragment("world".into()),
                FragmentEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_answer_translates_failure() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(StubGenerator {
            fragments: vec!["partial".into()],
            fail: true,
        });
        let collabs = collaborators(None, Some(generator));

        let events = drain(collabs.stream_answer(&query(), &[])).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], FragmentEvent::Fragment("partial".into()));
        assert!(matches!(&events[1], FragmentEvent::Error(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_streaming_and_buffered_answers_match() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(StubGenerator {
            fragments: vec!["one ".into(), "two ".into(), "three".into()],
            fail: false,
        });
        let collabs = collaborators(None, Some(generator));

        let buffered = collabs.answer(&query(), &[]).await.unwrap();
        let streamed: String = drain(collabs.stream_answer(&query(), &[]))
            .await
            .into_iter()
            .filter_map(|event| match event {
                FragmentEvent::Fragment(text) => Some(text),
                _ => None,
            })
            .collect();

        assert_eq!(streamed, buffered);
    }

    #[tokio::test]
    async fn test_from_config_without_credentials() {
        // SAFETY: test-only env var manipulation
        unsafe {
            std::env::remove_var("SCRY_TEST_NO_SEARCH_KEY");
            std::env::remove_var("SCRY_TEST_NO_LLM_KEY");
        }
        let mut config = ScryConfig::default();
        config.search.api_key_env = "SCRY_TEST_NO_SEARCH_KEY".into();
        config.llm.api_key_env = "SCRY_TEST_NO_LLM_KEY".into();

        let collabs = Collaborators::from_config(&config);
        assert!(!collabs.has_retriever());
        assert!(!collabs.has_generator());
    }
}

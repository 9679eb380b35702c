//! Keyword relevance ranking of retrieved sources.
//!
//! A deliberately simple lexical scorer: each query word contributes a
//! weighted point per source field that contains it, title matches
//! weighted above content matches. No ML, no embeddings — fast, fully
//! deterministic, and good enough to put the obviously-relevant hits
//! first before the answer generator sees them.

use crate::config::RankingConfig;
use crate::types::Source;
use std::collections::HashSet;

/// Scores and re-orders sources by lexical relevance to a query.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Score every source against the query and return the set re-ordered
    /// by descending score.
    ///
    /// Pure: the returned vector is a permutation of the input with
    /// `relevance_score` populated on every element. The sort is stable,
    /// so equal scores keep their original retrieval order. Zero-score
    /// sources are kept; any top-N cap is the caller's policy.
    pub fn rank(&self, query: &str, sources: Vec<Source>) -> Vec<Source> {
        // Set semantics: duplicate query words count once.
        let query_words: HashSet<String> = query
            .split_whitespace()
            .map(|word| word.to_lowercase())
            .collect();

        let mut ranked = sources;
        for source in &mut ranked {
            source.relevance_score = Some(self.score(&query_words, source));
        }
        ranked.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    /// Weighted count of query words contained in the title and content,
    /// case-insensitive substring containment per word.
    fn score(&self, query_words: &HashSet<String>, source: &Source) -> f64 {
        let title = source.title.to_lowercase();
        let content = source.content.to_lowercase();

        let mut score = 0.0;
        for word in query_words {
            if title.contains(word.as_str()) {
                score += self.config.title_weight;
            }
            if content.contains(word.as_str()) {
                score += self.config.content_weight;
            }
        }
        score
    }
}

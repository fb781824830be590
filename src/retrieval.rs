//! Similarity-ranked segment retrieval with a keyword fallback.
//!
//! Retrieval must never block the chat flow: when no segment carries a
//! vector, or when embedding the query itself fails, ranking degrades to
//! keyword matching instead of surfacing an error to the caller.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::chunking::Segment;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};

/// Query tokens this short are discarded before keyword matching.
const MIN_KEYWORD_LEN: usize = 4;

/// Ranks document segments against a query.
#[derive(Clone, Copy, Debug, Default)]
pub struct Retriever;

impl Retriever {
    /// Returns the content of the `top_k` segments most relevant to `query`,
    /// most relevant first.
    ///
    /// Uses cosine similarity over embedded segments when possible. Falls
    /// back to [`Self::retrieve_by_keyword`] when no segment has a vector
    /// (the provider is never called in that case) or when embedding the
    /// query fails.
    pub async fn retrieve(
        &self,
        query: &str,
        segments: &[Segment],
        provider: &dyn EmbeddingProvider,
        top_k: usize,
    ) -> Vec<String> {
        let has_embeddings = segments.iter().any(Segment::has_embedding);
        if !has_embeddings {
            debug!("no segment embeddings available, using keyword fallback");
            return self.retrieve_by_keyword(query, segments, top_k);
        }

        let query_embedding = match provider.embed(query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                // Diagnostic so a provider outage is distinguishable from
                // genuinely irrelevant content downstream.
                warn!(error = %err, "query embedding failed, using keyword fallback");
                return self.retrieve_by_keyword(query, segments, top_k);
            }
        };

        let mut scored: Vec<(&Segment, f32)> = segments
            .iter()
            .filter_map(|segment| {
                segment
                    .embedding
                    .as_ref()
                    .map(|vector| (segment, cosine_similarity(&query_embedding, vector)))
            })
            .collect();

        // Stable sort keeps original segment order on ties.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let results: Vec<String> = scored
            .into_iter()
            .take(top_k)
            .map(|(segment, _)| segment.content.clone())
            .collect();
        debug!(count = results.len(), "retrieved segments by similarity");
        results
    }

    /// Keyword-matching fallback ranking.
    ///
    /// Lower-cases the query, splits on whitespace, drops tokens of length
    /// ≤ 3, and scores each segment by how many distinct keywords its
    /// lower-cased content contains. Zero-match segments are excluded unless
    /// nothing matched at all, in which case (as when the keyword list is
    /// empty) the first `top_k` segments are returned in original order.
    pub fn retrieve_by_keyword(
        &self,
        query: &str,
        segments: &[Segment],
        top_k: usize,
    ) -> Vec<String> {
        let lowered = query.to_lowercase();
        let keywords: HashSet<&str> = lowered
            .split_whitespace()
            .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
            .collect();

        let first_k = |segments: &[Segment]| -> Vec<String> {
            segments
                .iter()
                .take(top_k)
                .map(|s| s.content.clone())
                .collect()
        };

        if keywords.is_empty() {
            debug!("query has no usable keywords, returning leading segments");
            return first_k(segments);
        }

        let mut scored: Vec<(&Segment, usize)> = segments
            .iter()
            .map(|segment| {
                let content = segment.content.to_lowercase();
                let matches = keywords
                    .iter()
                    .filter(|keyword| content.contains(*keyword))
                    .count();
                (segment, matches)
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));

        if scored.iter().all(|(_, score)| *score == 0) {
            debug!("no segment matched any keyword, returning leading segments");
            return first_k(segments);
        }

        scored
            .into_iter()
            .filter(|(_, score)| *score > 0)
            .take(top_k)
            .map(|(segment, _)| segment.content.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatError, ChatResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Provider returning a fixed query vector and counting calls.
    struct FixedProvider {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, _text: &str) -> ChatResult<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        async fn embed(&self, _text: &str) -> ChatResult<Vec<f32>> {
            Err(ChatError::Service {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    fn plain_segments(contents: &[&str]) -> Vec<Segment> {
        contents.iter().map(|content| Segment::new(*content)).collect()
    }

    /// Unit vectors whose first component equals their cosine similarity
    /// against the query vector [1, 0].
    fn embedded_segments(scores: &[(&str, f32)]) -> Vec<Segment> {
        scores
            .iter()
            .map(|(content, score)| {
                let y = (1.0 - score * score).sqrt();
                Segment::new(*content).with_embedding(vec![*score, y])
            })
            .collect()
    }

    #[tokio::test]
    async fn no_vectors_means_no_provider_call() {
        let provider = FixedProvider::new(vec![1.0, 0.0]);
        let segments = plain_segments(&["the quick brown fox", "jumped over"]);
        let results = Retriever
            .retrieve("quick question", &segments, &provider, 3)
            .await;
        assert!(!results.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn similarity_ranking_orders_by_score() {
        let provider = FixedProvider::new(vec![1.0, 0.0]);
        let segments = embedded_segments(&[("first", 0.9), ("second", 0.1), ("third", 0.5)]);
        let results = Retriever.retrieve("query", &segments, &provider, 2).await;
        assert_eq!(results, vec!["first".to_string(), "third".to_string()]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn query_embedding_failure_falls_back_to_keywords() {
        let segments = vec![
            Segment::new("nothing relevant here").with_embedding(vec![0.0, 1.0]),
            Segment::new("contains turbine details").with_embedding(vec![1.0, 0.0]),
        ];
        let results = Retriever
            .retrieve("turbine maintenance", &segments, &BrokenProvider, 2)
            .await;
        // Keyword fallback picks the matching segment first.
        assert_eq!(results[0], "contains turbine details");
    }

    #[test]
    fn short_token_query_returns_leading_segments() {
        let segments = plain_segments(&["one", "two", "three", "four"]);
        let results = Retriever.retrieve_by_keyword("the cat sat", &segments, 3);
        assert_eq!(
            results,
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }

    #[test]
    fn zero_match_fallback_returns_leading_segments() {
        let segments = plain_segments(&["apples and pears", "oranges"]);
        let results = Retriever.retrieve_by_keyword("quantum chromodynamics", &segments, 1);
        assert_eq!(results, vec!["apples and pears".to_string()]);
    }

    #[test]
    fn matching_segments_rank_above_non_matching() {
        let segments = plain_segments(&[
            "a chapter about geology",
            "volcanoes and magma chambers",
            "volcanoes, magma, and eruption cycles",
        ]);
        let results = Retriever.retrieve_by_keyword("magma volcanoes eruption", &segments, 2);
        assert_eq!(results[0], "volcanoes, magma, and eruption cycles");
        assert_eq!(results[1], "volcanoes and magma chambers");
    }

    #[test]
    fn duplicate_query_words_count_once() {
        let segments = plain_segments(&["magma flows", "basalt columns basalt"]);
        // "magma magma magma" is one distinct keyword; both-keyword segment
        // ordering must not be inflated by repetition.
        let results = Retriever.retrieve_by_keyword("magma magma magma", &segments, 2);
        assert_eq!(results, vec!["magma flows".to_string()]);
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let segments = plain_segments(&["The MAGMA Chamber"]);
        let results = Retriever.retrieve_by_keyword("magma", &segments, 1);
        assert_eq!(results, vec!["The MAGMA Chamber".to_string()]);
    }
}

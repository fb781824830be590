//! Embedding generation and vector similarity.
//!
//! [`EmbeddingProvider`] is the seam between the chat core and the external
//! embeddings API. The production implementation lives in
//! [`openai::OpenAiEmbeddingProvider`]; [`MockEmbeddingProvider`] produces
//! deterministic vectors for tests and offline runs.

pub mod openai;
pub mod pipeline;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::types::ChatResult;

pub use openai::OpenAiEmbeddingProvider;
pub use pipeline::{EmbeddingPipeline, EmbeddingProgress, EmbeddingStatus};

/// Maps a piece of text to a fixed-length numeric vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generates an embedding for `text`.
    ///
    /// Fails with [`ChatError::InvalidInput`](crate::ChatError::InvalidInput)
    /// on empty input and [`ChatError::Auth`](crate::ChatError::Auth) when no
    /// credential is configured, before touching the network.
    async fn embed(&self, text: &str) -> ChatResult<Vec<f32>>;
}

/// Cosine similarity of two vectors, in `[-1, 1]`.
///
/// Total function: returns 0 when the vectors differ in length or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let mag_a = mag_a.sqrt();
    let mag_b = mag_b.sqrt();
    if mag_a <= 0.0 || mag_b <= 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Deterministic embedding provider for tests and offline use.
///
/// Vectors are derived from a hash of the input text, so identical inputs
/// always map to identical unit vectors and different inputs almost always
/// differ.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Creates a provider emitting 8-dimensional vectors.
    pub fn new() -> Self {
        Self { dimensions: 8 }
    }

    /// Creates a provider emitting vectors of the given dimensionality.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> ChatResult<Vec<f32>> {
        if text.is_empty() {
            return Err(crate::ChatError::InvalidInput(
                "cannot embed empty text".into(),
            ));
        }

        let mut vector = Vec::with_capacity(self.dimensions);
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();
        for _ in 0..self.dimensions {
            // xorshift over the text hash gives a stable pseudo-random vector
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            vector.push(((seed % 2000) as f32 / 1000.0) - 1.0);
        }

        let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatError;

    #[test]
    fn similarity_of_vector_with_itself_is_one() {
        let v = vec![0.3, -0.7, 0.2, 0.9];
        let score = cosine_similarity(&v, &v);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_is_zero_on_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn similarity_is_zero_for_zero_magnitude() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        let c = provider.embed("goodbye world").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn mock_provider_emits_unit_vectors() {
        let provider = MockEmbeddingProvider::with_dimensions(16);
        let v = provider.embed("some text").await.unwrap();
        let magnitude = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn mock_provider_rejects_empty_text() {
        let provider = MockEmbeddingProvider::new();
        let err = provider.embed("").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }
}

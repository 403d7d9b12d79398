//! C3 — Embedding provider. Deterministic, configuration-driven: dimension
//! and model identity come from [`crate::config::EmbeddingConfig`], never
//! from runtime-observed vocabulary.

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};

/// Produces embeddings for chunk text and questions. A trait so the
/// Postgres-backed store and the retriever can be tested against a fake
/// without a real model endpoint.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Cosine similarity between two equal-length vectors, clamped to
/// `[-1.0, 1.0]` to absorb floating-point drift from the dot-product
/// computation.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Deterministic hashing-based embedding: every input token is folded into
/// a fixed-width vector via a stable hash, then the vector is L2-normalized.
/// Same text always yields the same vector, with no external model call and
/// no vocabulary that drifts as new documents are ingested — unlike the
/// corpus-fitted TF-IDF approach, the dimension is fixed up front by
/// configuration and never depends on what has been indexed so far.
pub struct HashingEmbeddingProvider {
    config: EmbeddingConfig,
}

impl HashingEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        HashingEmbeddingProvider { config }
    }

    fn approx_token_count(text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let tokens = Self::approx_token_count(text);
        if tokens > self.config.max_input_tokens {
            return Err(EmbedError::InputTooLong(tokens));
        }

        let dim = self.config.dimension;
        let mut vec = vec![0.0f32; dim];

        for token in text.split_whitespace().map(str::to_lowercase) {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % dim;
            let sign = if (h >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            vec[idx] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vec)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EmbeddingConfig {
        EmbeddingConfig {
            model_id: "hashing-v1".to_string(),
            dimension: 64,
            max_input_tokens: 1000,
        }
    }

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let provider = HashingEmbeddingProvider::new(cfg());
        let a = provider.embed_one("hello there").await.unwrap();
        let b = provider.embed_one("hello there").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vector_has_configured_dimension_and_unit_norm() {
        let provider = HashingEmbeddingProvider::new(cfg());
        let v = provider.embed_one("some chunk of text to embed").await.unwrap();
        assert_eq!(v.len(), 64);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn rejects_input_over_token_budget() {
        let provider = HashingEmbeddingProvider::new(cfg());
        let long = "word ".repeat(2000);
        let err = provider.embed_one(&long).await.unwrap_err();
        assert!(matches!(err, EmbedError::InputTooLong(_)));
    }

    #[test]
    fn similarity_is_one_for_identical_vectors() {
        let v = vec![1.0, 0.0, 1.0];
        assert!((similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_is_zero_for_mismatched_lengths() {
        assert_eq!(similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn similarity_is_clamped() {
        let a = vec![1.0, 1.0];
        let b = vec![1.0000001, 0.9999999];
        assert!(similarity(&a, &b) <= 1.0);
    }
}

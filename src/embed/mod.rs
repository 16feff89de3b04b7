//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - An OpenAI-compatible HTTP backend
//! - Batch processing for efficiency

mod http_backend;

pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for embedding providers
///
/// Implementations must be deterministic for identical input and model
/// version, and report failures as `Error::Embedding` so callers can retry.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length
pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Create an embedder based on configuration
pub fn create_embedder(
    config: &EmbeddingConfig,
    api_key: Option<String>,
) -> Result<Box<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config, api_key)?;
    Ok(Box::new(embedder))
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let embeddings = embedder.embed(batch).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_embedding() {
        let normalized = normalize_embedding(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);

        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let normalized = normalize_embedding(&[0.0, 0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_batch_splitting() {
        let texts: Vec<String> = (0..10).map(|i| format!("text {}", i)).collect();
        let batches: Vec<_> = texts.chunks(3).collect();

        assert_eq!(batches.len(), 4); // 3 + 3 + 3 + 1
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[3].len(), 1);
    }
}

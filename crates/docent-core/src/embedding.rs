//! Embedding provider trait, throttled sub-batching and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus the helpers that wrap provider calls in bounded retry.
//!
//! Concrete providers (OpenAI, Azure OpenAI) live in the `docent` app crate.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::retry::{retry_with_backoff, RetryPolicy};

/// Trait for embedding providers.
///
/// Implementations are created by the application and injected wherever
/// text has to be turned into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed every input text, returning one vector per text in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Sub-batching and retry settings for bulk embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedBatching {
    /// Texts per provider call.
    pub batch_size: usize,
    /// Pause between consecutive provider calls.
    pub pause: Duration,
    /// Retry applied to each provider call.
    pub retry: RetryPolicy,
}

impl Default for EmbedBatching {
    fn default() -> Self {
        Self {
            batch_size: 16,
            pause: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

/// Embed `texts` in sub-batches, pausing between calls.
///
/// Each sub-batch is retried per `batching.retry`; a sub-batch that still
/// fails aborts the whole call. The output has exactly one vector per input.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batching: &EmbedBatching,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batching.batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());
    let total_batches = texts.len().div_ceil(batch_size);

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        if i > 0 && !batching.pause.is_zero() {
            tokio::time::sleep(batching.pause).await;
        }

        let batch_vectors = retry_with_backoff(&batching.retry, || provider.embed(batch)).await?;
        if batch_vectors.len() != batch.len() {
            bail!(
                "embedding provider returned {} vectors for {} texts",
                batch_vectors.len(),
                batch.len()
            );
        }
        vectors.extend(batch_vectors);

        tracing::debug!(batch = i + 1, total_batches, "embedded batch");
    }

    Ok(vectors)
}

/// Embed a single query string with bounded retry.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    query: &str,
    policy: &RetryPolicy,
) -> Result<Vec<f32>> {
    let input = vec![query.to_string()];
    let mut vectors = retry_with_backoff(policy, || provider.embed(&input)).await?;
    match vectors.pop() {
        Some(v) if vectors.is_empty() => Ok(v),
        _ => bail!("embedding provider returned an unexpected number of vectors for a query"),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

//! Batching, retrying front end over an [`EmbeddingProvider`].
//!
//! The client splits large inputs into provider-sized batches, retries
//! retryable failures with exponential backoff, and validates every
//! response: one vector per input, each of the provider's dimension.

use std::sync::Arc;
use std::time::Duration;

use code_index_core::embedding::EmbeddingProvider;
use code_index_core::{IndexError, Result};

use crate::config::EmbeddingConfig;

/// Largest backoff exponent: delays stop doubling after `backoff * 32`.
const MAX_BACKOFF_SHIFT: u32 = 5;

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_retries: u32,
    backoff: Duration,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        max_retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            max_retries,
            backoff,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(
            provider,
            config.batch_size,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::embedding("empty embedding response"))
    }

    /// Embed many texts, preserving input order.
    ///
    /// Empty strings are rejected up front. A failure in any batch fails the
    /// whole call; no partial results are returned.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(pos) = texts.iter().position(|t| t.is_empty()) {
            return Err(IndexError::embedding(format!(
                "cannot embed empty text (input {})",
                pos
            )));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.embed_with_retry(batch).await?;
            self.validate(batch.len(), &embedded)?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            match self.provider.embed_texts(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff * (1u32 << (attempt - 1).min(MAX_BACKOFF_SHIFT));
                    tracing::warn!(
                        model = self.provider.model_name(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn validate(&self, expected_count: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected_count {
            return Err(IndexError::embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                expected_count
            )));
        }

        let expected = match self.provider.dims() {
            0 => vectors.first().map(Vec::len).unwrap_or(0),
            dims => dims,
        };
        match vectors.iter().find(|v| v.len() != expected) {
            Some(v) => Err(IndexError::DimensionMismatch {
                expected,
                actual: v.len(),
            }),
            None => Ok(()),
        }
    }
}

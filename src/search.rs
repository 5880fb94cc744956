//! Semantic search over the code index.
//!
//! [`SearchService`] embeds the query text with the same client used for
//! indexing and delegates ranking to the [`IndexStore`]. Scores are cosine
//! similarity in `[-1.0, 1.0]`; ties are broken by filename, then start
//! offset.

use std::sync::Arc;

use anyhow::Result;

use code_index_core::models::SearchHit;
use code_index_core::store::IndexStore;
use code_index_core::IndexError;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingClient};
use crate::sqlite_store;

#[derive(Clone)]
pub struct SearchService {
    embedder: EmbeddingClient,
    index: Arc<dyn IndexStore>,
    default_top_k: usize,
}

impl SearchService {
    pub fn new(
        embedder: EmbeddingClient,
        index: Arc<dyn IndexStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            default_top_k,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Rank stored chunks against `query`.
    ///
    /// `top_k` of `None` uses the configured default (5 unless
    /// `retrieval.default_top_k` says otherwise). `top_k` is best-effort:
    /// fewer hits come back when the index is smaller, and `Some(0)` returns
    /// an empty list. An empty or whitespace-only query is `InvalidQuery`.
    /// Neither case reaches the embedding provider.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> code_index_core::Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(IndexError::InvalidQuery("query text is empty".to_string()));
        }
        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let hits = self.index.query(&vector, top_k).await?;
        tracing::debug!(top_k, hits = hits.len(), "search complete");
        Ok(hits)
    }
}

/// CLI entry point for `cidx search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let provider = create_provider(&config.embedding)?;
    let embedder = EmbeddingClient::from_config(provider, &config.embedding);
    let (index, _) = sqlite_store::open_stores(config).await?;
    let pool = index.pool().clone();
    let service = SearchService::new(embedder, Arc::new(index), config.retrieval.default_top_k);

    let hits = service.search(query, top_k).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}:{}-{}",
            i + 1,
            hit.score,
            hit.filename,
            hit.start.line,
            hit.end.line
        );
        for line in snippet(&hit.text, 4).lines() {
            println!("    {}", line);
        }
        println!();
    }

    Ok(())
}

fn snippet(text: &str, max_lines: usize) -> String {
    let mut lines: Vec<&str> = text.lines().take(max_lines).collect();
    if text.lines().count() > max_lines {
        lines.push("...");
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use code_index_core::embedding::EmbeddingProvider;
    use code_index_core::models::{IndexEntry, Location, Position};
    use code_index_core::store::memory::InMemoryIndexStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns a fixed vector for every text and counts calls.
    struct FixedProvider {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.vector.len()
        }
        async fn embed_texts(&self, texts: &[String]) -> code_index_core::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn entry(filename: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            filename: filename.to_string(),
            location: Location {
                start: Position {
                    line: 1,
                    byte_offset: 0,
                },
                end: Position {
                    line: 2,
                    byte_offset: 10,
                },
            },
            text: format!("body of {}", filename),
            embedding,
        }
    }

    async fn service(query_vector: Vec<f32>) -> (SearchService, Arc<FixedProvider>) {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .upsert(&[
                entry("one.rs", vec![1.0, 0.0, 0.0]),
                entry("two.rs", vec![0.0, 1.0, 0.0]),
                entry("three.rs", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        let provider = Arc::new(FixedProvider {
            vector: query_vector,
            calls: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone(), 8, 0, Duration::ZERO);
        (SearchService::new(client, index, 5), provider)
    }

    #[tokio::test]
    async fn test_closest_chunk_ranks_first() {
        let (svc, _) = service(vec![0.1, 0.9, 0.2]).await;
        let hits = svc.search("find two", Some(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "two.rs");
        assert_eq!(hits[0].text, "body of two.rs");
        assert_eq!(hits[0].end.byte_offset, 10);

        let all = svc.search("find two", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].filename, "two.rs");
        assert!(all.iter().skip(1).all(|h| h.score < all[0].score));
    }

    #[tokio::test]
    async fn test_top_k_larger_than_index() {
        let (svc, _) = service(vec![1.0, 0.0, 0.0]).await;
        assert_eq!(svc.search("q", Some(50)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_embedding() {
        let (svc, provider) = service(vec![1.0, 0.0, 0.0]).await;
        for q in ["", "   \n\t"] {
            let err = svc.search(q, Some(3)).await.unwrap_err();
            assert!(matches!(err, IndexError::InvalidQuery(_)));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_top_k_returns_nothing() {
        let (svc, provider) = service(vec![1.0, 0.0, 0.0]).await;
        assert!(svc.search("q", Some(0)).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let (svc, _) = service(vec![1.0, 0.0]).await;
        let err = svc.search("q", Some(3)).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_snippet_truncates() {
        assert_eq!(snippet("a\nb\nc", 2), "a\nb\n...");
        assert_eq!(snippet("a\nb", 2), "a\nb");
    }
}

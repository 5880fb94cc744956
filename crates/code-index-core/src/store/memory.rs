//! In-memory store implementations for testing and embedding in other tools.
//!
//! Both stores keep their state behind `std::sync::RwLock`. Vector search
//! is brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{IndexError, Result};
use crate::models::{ChunkKey, IndexEntry, SearchHit};
use crate::search::rank_hits;

use super::{check_batch_dims, check_entries_belong, check_query_dim, FingerprintStore, IndexStore};

fn poisoned<T>(_: T) -> IndexError {
    IndexError::storage("in-memory store lock poisoned")
}

#[derive(Default)]
pub struct InMemoryFingerprintStore {
    fingerprints: RwLock<BTreeMap<String, String>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, filename: &str) -> Result<Option<String>> {
        let map = self.fingerprints.read().map_err(poisoned)?;
        Ok(map.get(filename).cloned())
    }

    async fn put(&self, filename: &str, fingerprint: &str) -> Result<()> {
        let mut map = self.fingerprints.write().map_err(poisoned)?;
        map.insert(filename.to_string(), fingerprint.to_string());
        Ok(())
    }

    async fn remove(&self, filename: &str) -> Result<()> {
        let mut map = self.fingerprints.write().map_err(poisoned)?;
        map.remove(filename);
        Ok(())
    }

    async fn list_known_filenames(&self) -> Result<BTreeSet<String>> {
        let map = self.fingerprints.read().map_err(poisoned)?;
        Ok(map.keys().cloned().collect())
    }
}

#[derive(Default)]
struct IndexState {
    entries: BTreeMap<ChunkKey, IndexEntry>,
    dim: Option<usize>,
}

/// In-memory index store. Entries are kept ordered by key, so
/// [`snapshot`](InMemoryIndexStore::snapshot) is deterministic.
#[derive(Default)]
pub struct InMemoryIndexStore {
    state: RwLock<IndexState>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry, ordered by `(filename, start offset)`.
    pub fn snapshot(&self) -> Result<Vec<IndexEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.entries.values().cloned().collect())
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.dim = check_batch_dims(entries, state.dim)?;
        for entry in entries {
            state.entries.insert(entry.key(), entry.clone());
        }
        Ok(())
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let mut state = self.state.write().map_err(poisoned)?;
        let before = state.entries.len();
        state.entries.retain(|k, _| k.filename != filename);
        Ok(before - state.entries.len())
    }

    async fn delete_keys(&self, keys: &[ChunkKey]) -> Result<usize> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut deleted = 0;
        for key in keys {
            if state.entries.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn entries_for_file(&self, filename: &str) -> Result<Vec<IndexEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .entries
            .range(ChunkKey::new(filename, 0)..)
            .take_while(|(k, _)| k.filename == filename)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn replace_file(&self, filename: &str, entries: &[IndexEntry]) -> Result<()> {
        check_entries_belong(filename, entries)?;
        let mut state = self.state.write().map_err(poisoned)?;
        state.dim = check_batch_dims(entries, state.dim)?;
        state.entries.retain(|k, _| k.filename != filename);
        for entry in entries {
            state.entries.insert(entry.key(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let state = self.state.read().map_err(poisoned)?;
        check_query_dim(vector, state.dim)?;
        let hits = state
            .entries
            .values()
            .map(|e| SearchHit {
                filename: e.filename.clone(),
                text: e.text.clone(),
                score: cosine_similarity(vector, &e.embedding),
                start: e.location.start,
                end: e.location.end,
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    async fn embedding_dim(&self) -> Result<Option<usize>> {
        Ok(self.state.read().map_err(poisoned)?.dim)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, Position};

    fn entry(filename: &str, start: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            filename: filename.to_string(),
            location: Location {
                start: Position {
                    line: 1,
                    byte_offset: start,
                },
                end: Position {
                    line: 1,
                    byte_offset: start + 4,
                },
            },
            text: format!("{}@{}", filename, start),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_fingerprint_roundtrip() {
        let store = InMemoryFingerprintStore::new();
        assert_eq!(store.get("a.rs").await.unwrap(), None);
        store.put("a.rs", "f1").await.unwrap();
        store.put("b.rs", "f2").await.unwrap();
        assert_eq!(store.get("a.rs").await.unwrap(), Some("f1".to_string()));
        store.remove("a.rs").await.unwrap();
        let known = store.list_known_filenames().await.unwrap();
        assert_eq!(known.into_iter().collect::<Vec<_>>(), vec!["b.rs".to_string()]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_key() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[entry("a.rs", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[entry("a.rs", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.entries_for_file("a.rs").await.unwrap();
        assert_eq!(stored[0].embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_change() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[entry("a.rs", 0, vec![1.0, 0.0])]).await.unwrap();
        let err = store
            .upsert(&[entry("b.rs", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_file_drops_stale_entries() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(&[
                entry("a.rs", 0, vec![1.0, 0.0]),
                entry("a.rs", 10, vec![1.0, 0.0]),
                entry("b.rs", 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        store
            .replace_file("a.rs", &[entry("a.rs", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        let a = store.entries_for_file("a.rs").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].embedding, vec![0.0, 1.0]);
        assert_eq!(store.entries_for_file("b.rs").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_file_rejects_foreign_entries() {
        let store = InMemoryIndexStore::new();
        let err = store
            .replace_file("a.rs", &[entry("b.rs", 0, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Storage(_)));
    }

    #[tokio::test]
    async fn test_delete_by_filename_and_keys() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(&[
                entry("a.rs", 0, vec![1.0]),
                entry("a.rs", 5, vec![1.0]),
                entry("ab.rs", 0, vec![1.0]),
            ])
            .await
            .unwrap();
        let deleted = store
            .delete_keys(&[ChunkKey::new("a.rs", 5), ChunkKey::new("zz", 1)])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.delete_by_filename("a.rs").await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.entries_for_file("ab.rs").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(&[
                entry("one.rs", 0, vec![1.0, 0.0, 0.0]),
                entry("two.rs", 0, vec![0.0, 1.0, 0.0]),
                entry("three.rs", 0, vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store.query(&[0.1, 0.9, 0.2], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "two.rs");

        let all = store.query(&[0.1, 0.9, 0.2], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[entry("a.rs", 0, vec![1.0, 0.0])]).await.unwrap();
        let err = store.query(&[1.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = InMemoryIndexStore::new();
        assert!(store.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }
}

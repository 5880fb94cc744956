//! Storage abstractions for the index.
//!
//! Two stores hold all durable state:
//!
//! - [`FingerprintStore`] maps each indexed filename to the fingerprint of
//!   the content that was last committed for it.
//! - [`IndexStore`] holds [`IndexEntry`] rows keyed by
//!   `(filename, start byte offset)` and answers similarity queries.
//!
//! Both are injected into the indexer and search service as trait objects,
//! so SQLite and in-memory backends are interchangeable. Implementations
//! must be `Send + Sync` and tolerate concurrent writes to *different*
//! filenames.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{IndexError, Result};
use crate::models::{ChunkKey, IndexEntry, SearchHit};

/// Per-file content fingerprints from the last successful commit.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn get(&self, filename: &str) -> Result<Option<String>>;
    async fn put(&self, filename: &str, fingerprint: &str) -> Result<()>;
    async fn remove(&self, filename: &str) -> Result<()>;
    async fn list_known_filenames(&self) -> Result<BTreeSet<String>>;
}

/// Vector-capable persistence for index entries.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](IndexStore::upsert) | Insert or overwrite entries by key |
/// | [`delete_by_filename`](IndexStore::delete_by_filename) | Drop every entry of one file |
/// | [`delete_keys`](IndexStore::delete_keys) | Drop specific entries |
/// | [`replace_file`](IndexStore::replace_file) | Make a file's entries exactly the given set |
/// | [`query`](IndexStore::query) | Top-k cosine similarity ranking |
///
/// The index has a single embedding dimension, fixed by the first write.
/// Writes or queries with a different dimension fail with
/// [`IndexError::DimensionMismatch`].
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Returns the number of entries removed.
    async fn delete_by_filename(&self, filename: &str) -> Result<usize>;

    /// Returns the number of entries removed. Missing keys are ignored.
    async fn delete_keys(&self, keys: &[ChunkKey]) -> Result<usize>;

    /// All entries of one file, ordered by start offset.
    async fn entries_for_file(&self, filename: &str) -> Result<Vec<IndexEntry>>;

    async fn keys_for_file(&self, filename: &str) -> Result<BTreeSet<ChunkKey>> {
        Ok(self
            .entries_for_file(filename)
            .await?
            .iter()
            .map(IndexEntry::key)
            .collect())
    }

    /// Upsert `entries` (all belonging to `filename`) and delete every other
    /// stored entry of that file.
    ///
    /// The default implementation is two separate steps. Backends that can
    /// should override it to apply both atomically.
    async fn replace_file(&self, filename: &str, entries: &[IndexEntry]) -> Result<()> {
        check_entries_belong(filename, entries)?;
        self.upsert(entries).await?;
        let fresh: BTreeSet<ChunkKey> = entries.iter().map(IndexEntry::key).collect();
        let stale: Vec<ChunkKey> = self
            .keys_for_file(filename)
            .await?
            .into_iter()
            .filter(|k| !fresh.contains(k))
            .collect();
        if !stale.is_empty() {
            self.delete_keys(&stale).await?;
        }
        Ok(())
    }

    /// Rank stored entries by cosine similarity to `vector`.
    ///
    /// Returns at most `top_k` hits, fewer if the index is smaller.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// The index-wide embedding dimension, once any entry has been written.
    async fn embedding_dim(&self) -> Result<Option<usize>>;

    async fn count(&self) -> Result<usize>;
}

/// Validate that a batch is internally consistent and matches `expected`.
///
/// Returns the batch dimension (or `expected` for an empty batch).
pub fn check_batch_dims(entries: &[IndexEntry], expected: Option<usize>) -> Result<Option<usize>> {
    let mut dim = expected;
    for entry in entries {
        let actual = entry.embedding_dim();
        match dim {
            Some(expected) if expected != actual => {
                return Err(IndexError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => dim = Some(actual),
        }
    }
    Ok(dim)
}

/// Validate a query vector against the index dimension.
pub fn check_query_dim(vector: &[f32], stored: Option<usize>) -> Result<()> {
    match stored {
        Some(expected) if expected != vector.len() => Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

pub fn check_entries_belong(filename: &str, entries: &[IndexEntry]) -> Result<()> {
    match entries.iter().find(|e| e.filename != filename) {
        Some(stray) => Err(IndexError::storage(format!(
            "entry for '{}' passed to replace_file('{}')",
            stray.filename, filename
        ))),
        None => Ok(()),
    }
}

//! SQLite-backed [`IndexStore`] and [`FingerprintStore`] implementations.
//!
//! Vectors are stored as little-endian f32 BLOBs in `code_embeddings`.
//! Similarity queries scan every stored vector and rank them in Rust with
//! the shared core ranking routine, the same brute-force approach the
//! in-memory store uses.
//!
//! Every write transaction opens with a write statement so that it takes
//! the SQLite write lock up front and waits on `busy_timeout` instead of
//! failing on a read-to-write upgrade when indexer workers overlap.

use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use code_index_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use code_index_core::models::{ChunkKey, IndexEntry, Location, Position, SearchHit};
use code_index_core::search::rank_hits;
use code_index_core::store::{
    check_batch_dims, check_entries_belong, check_query_dim, FingerprintStore, IndexStore,
};
use code_index_core::{IndexError, Result};

use crate::config::Config;
use crate::db;
use crate::migrate;

const DIM_KEY: &str = "embedding_dim";

fn db_err(e: sqlx::Error) -> IndexError {
    IndexError::storage(e)
}

/// Connect to the configured database, run migrations, and build both stores
/// over one shared pool.
pub async fn open_stores(
    config: &Config,
) -> anyhow::Result<(SqliteIndexStore, SqliteFingerprintStore)> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open database {}", config.db.path.display()))?;
    migrate::run_migrations(&pool).await?;
    Ok((
        SqliteIndexStore::new(pool.clone()),
        SqliteFingerprintStore::new(pool),
    ))
}

/// SQLite implementation of [`IndexStore`] over the `code_embeddings` table.
#[derive(Clone)]
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every stored entry ordered by `(filename, start_offset)`.
    pub async fn snapshot(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            "SELECT filename, start_offset, start_line, end_offset, end_line, text, embedding \
             FROM code_embeddings ORDER BY filename ASC, start_offset ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_entry).collect())
    }
}

fn row_to_entry(row: &SqliteRow) -> IndexEntry {
    let blob: Vec<u8> = row.get("embedding");
    IndexEntry {
        filename: row.get("filename"),
        location: row_location(row),
        text: row.get("text"),
        embedding: blob_to_vec(&blob),
    }
}

fn row_location(row: &SqliteRow) -> Location {
    let start_offset: i64 = row.get("start_offset");
    let start_line: i64 = row.get("start_line");
    let end_offset: i64 = row.get("end_offset");
    let end_line: i64 = row.get("end_line");
    Location {
        start: Position {
            line: start_line as usize,
            byte_offset: start_offset as usize,
        },
        end: Position {
            line: end_line as usize,
            byte_offset: end_offset as usize,
        },
    }
}

/// Record the batch dimension if none is stored yet, then verify it.
///
/// Issued first in each write transaction: the `INSERT` takes the write lock.
async fn ensure_dim(conn: &mut SqliteConnection, dim: usize) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
        .bind(DIM_KEY)
        .bind(dim.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    let stored: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(DIM_KEY)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    let expected = parse_dim(&stored)?;
    if expected != dim {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: dim,
        });
    }
    Ok(())
}

fn parse_dim(value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| IndexError::storage(format!("corrupt {} value '{}'", DIM_KEY, value)))
}

async fn upsert_entry(conn: &mut SqliteConnection, entry: &IndexEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO code_embeddings
            (filename, start_offset, start_line, end_offset, end_line, text, embedding, embedding_dim)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(filename, start_offset) DO UPDATE SET
            start_line = excluded.start_line,
            end_offset = excluded.end_offset,
            end_line = excluded.end_line,
            text = excluded.text,
            embedding = excluded.embedding,
            embedding_dim = excluded.embedding_dim
        "#,
    )
    .bind(&entry.filename)
    .bind(entry.location.start.byte_offset as i64)
    .bind(entry.location.start.line as i64)
    .bind(entry.location.end.byte_offset as i64)
    .bind(entry.location.end.line as i64)
    .bind(&entry.text)
    .bind(vec_to_blob(&entry.embedding))
    .bind(entry.embedding_dim() as i64)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let Some(dim) = check_batch_dims(entries, None)? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        ensure_dim(&mut tx, dim).await?;
        for entry in entries {
            upsert_entry(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM code_embeddings WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_keys(&self, keys: &[ChunkKey]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut removed = 0usize;
        for key in keys {
            let result =
                sqlx::query("DELETE FROM code_embeddings WHERE filename = ? AND start_offset = ?")
                    .bind(&key.filename)
                    .bind(key.start_offset as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            removed += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(removed)
    }

    async fn entries_for_file(&self, filename: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            "SELECT filename, start_offset, start_line, end_offset, end_line, text, embedding \
             FROM code_embeddings WHERE filename = ? ORDER BY start_offset ASC",
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_entry).collect())
    }

    async fn keys_for_file(&self, filename: &str) -> Result<BTreeSet<ChunkKey>> {
        let offsets: Vec<i64> =
            sqlx::query_scalar("SELECT start_offset FROM code_embeddings WHERE filename = ?")
                .bind(filename)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(offsets
            .into_iter()
            .map(|o| ChunkKey::new(filename, o as usize))
            .collect())
    }

    async fn replace_file(&self, filename: &str, entries: &[IndexEntry]) -> Result<()> {
        check_entries_belong(filename, entries)?;
        let batch_dim = check_batch_dims(entries, None)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        match batch_dim {
            Some(dim) => ensure_dim(&mut tx, dim).await?,
            None => {
                sqlx::query("DELETE FROM code_embeddings WHERE filename = ?")
                    .bind(filename)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        for entry in entries {
            upsert_entry(&mut tx, entry).await?;
        }

        let fresh: BTreeSet<i64> = entries
            .iter()
            .map(|e| e.location.start.byte_offset as i64)
            .collect();
        let existing: Vec<i64> =
            sqlx::query_scalar("SELECT start_offset FROM code_embeddings WHERE filename = ?")
                .bind(filename)
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err)?;
        for offset in existing.into_iter().filter(|o| !fresh.contains(o)) {
            sqlx::query("DELETE FROM code_embeddings WHERE filename = ? AND start_offset = ?")
                .bind(filename)
                .bind(offset)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        check_query_dim(vector, self.embedding_dim().await?)?;

        let rows = sqlx::query(
            "SELECT filename, start_offset, start_line, end_offset, end_line, text, embedding \
             FROM code_embeddings",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let location = row_location(row);
                SearchHit {
                    filename: row.get("filename"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                    start: location.start,
                    end: location.end,
                }
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn embedding_dim(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIM_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        value.as_deref().map(parse_dim).transpose()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM code_embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

/// SQLite implementation of [`FingerprintStore`] over `file_fingerprints`.
#[derive(Clone)]
pub struct SqliteFingerprintStore {
    pool: SqlitePool,
}

impl SqliteFingerprintStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn get(&self, filename: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT fingerprint FROM file_fingerprints WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn put(&self, filename: &str, fingerprint: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO file_fingerprints (filename, fingerprint, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(filename)
        .bind(fingerprint)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn remove(&self, filename: &str) -> Result<()> {
        sqlx::query("DELETE FROM file_fingerprints WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_known_filenames(&self) -> Result<BTreeSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT filename FROM file_fingerprints")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(names.into_iter().collect())
    }
}

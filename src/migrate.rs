//! Database schema migrations.
//!
//! All statements are idempotent, so running them on every open is safe.
//!
//! | Table | Key | Purpose |
//! |-------|-----|---------|
//! | `code_embeddings` | `(filename, start_offset)` | Chunk text, span, and vector |
//! | `file_fingerprints` | `filename` | Content hash of the last committed version |
//! | `index_meta` | `key` | Index-wide settings such as `embedding_dim` |

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS code_embeddings (
            filename TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            embedding_dim INTEGER NOT NULL,
            PRIMARY KEY (filename, start_offset)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_fingerprints (
            filename TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_code_embeddings_filename ON code_embeddings(filename)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

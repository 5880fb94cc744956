//! Index statistics and health overview.
//!
//! Summarizes what is indexed: tracked files, stored chunks, the
//! index-wide embedding dimension, and the files holding the most chunks.
//! Used by `cidx stats` to confirm that reindexing is doing what you expect.

use anyhow::Result;
use sqlx::Row;

use code_index_core::store::IndexStore;

use crate::config::Config;
use crate::sqlite_store;

const TOP_FILES: i64 = 10;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let (index, _) = sqlite_store::open_stores(config).await?;
    let pool = index.pool().clone();

    let tracked_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_fingerprints")
        .fetch_one(&pool)
        .await?;
    let indexed_files: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT filename) FROM code_embeddings")
            .fetch_one(&pool)
            .await?;
    let total_chunks = index.count().await?;
    let dim = index.embedding_dim().await?;
    let last_update: Option<i64> =
        sqlx::query_scalar("SELECT MAX(updated_at) FROM file_fingerprints")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Code Index Stats");
    println!("================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Files:       {} tracked, {} with chunks", tracked_files, indexed_files);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Dimension:   {}",
        dim.map(|d| d.to_string()).unwrap_or_else(|| "unset".to_string())
    );
    println!(
        "  Last update: {}",
        last_update
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    let rows = sqlx::query(
        r#"
        SELECT filename, COUNT(*) AS chunk_count
        FROM code_embeddings
        GROUP BY filename
        ORDER BY chunk_count DESC, filename ASC
        LIMIT ?
        "#,
    )
    .bind(TOP_FILES)
    .fetch_all(&pool)
    .await?;

    if !rows.is_empty() {
        println!();
        println!("  Most chunks:");
        println!("  {:<56} {:>8}", "FILE", "CHUNKS");
        println!("  {}", "-".repeat(65));
        for row in &rows {
            let filename: String = row.get("filename");
            let chunk_count: i64 = row.get("chunk_count");
            println!("  {:<56} {:>8}", filename, chunk_count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

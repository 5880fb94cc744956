//! Reindex command orchestration.
//!
//! Wires the configured source tree, embedding provider, and SQLite stores
//! into an [`Indexer`] and prints the pass summary. Ctrl-C cancels the pass
//! at the next file boundary; files already committed stay committed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;

use code_index_core::models::ReindexReport;

use crate::config::Config;
use crate::connector_fs::FsSourceTree;
use crate::embedding::{create_provider, EmbeddingClient};
use crate::indexer::{IndexPlan, Indexer};
use crate::progress::ProgressMode;
use crate::sqlite_store;

/// Build an indexer over the configured stores. The pool is returned so the
/// caller can close it once the pass is done.
pub async fn build_indexer(config: &Config) -> Result<(Indexer, SqlitePool)> {
    let chunk_config = config.chunking.to_chunk_config()?;
    let source = FsSourceTree::new(&config.source)?;
    let provider = create_provider(&config.embedding)?;
    let embedder = EmbeddingClient::from_config(provider, &config.embedding);
    let (index, fingerprints) = sqlite_store::open_stores(config).await?;
    let pool = index.pool().clone();

    let indexer = Indexer::new(
        Arc::new(source),
        chunk_config,
        embedder,
        Arc::new(index),
        Arc::new(fingerprints),
    )
    .with_concurrency(config.indexing.concurrency);

    Ok((indexer, pool))
}

pub async fn run_reindex(
    config: &Config,
    dry_run: bool,
    json: bool,
    progress: ProgressMode,
) -> Result<ReindexReport> {
    if !dry_run && !config.embedding.is_enabled() {
        bail!("Reindex requires embeddings. Set [embedding] provider in config.");
    }

    let (indexer, pool) = build_indexer(config).await?;

    if dry_run {
        let plan = indexer.plan().await?;
        pool.close().await;
        print_plan(&plan, json)?;
        return Ok(ReindexReport::default());
    }

    let indexer = indexer.with_progress(Arc::from(progress.reporter()));
    let cancel = indexer.cancel_flag();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after in-flight files");
            cancel.cancel();
        }
    });

    let result = indexer.reindex().await;
    signal_task.abort();
    pool.close().await;
    let report = result.context("Reindex aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &ReindexReport) {
    println!("reindex");
    println!("  added: {}", report.added);
    println!("  modified: {}", report.modified);
    println!("  removed: {}", report.removed);
    println!("  unchanged: {}", report.unchanged);
    println!("  chunks embedded: {}", report.chunks_embedded);
    if !report.failures.is_empty() {
        println!("  failures: {}", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.filename, failure.reason);
        }
    }
    if report.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}

fn print_plan(plan: &IndexPlan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    println!("reindex (dry-run)");
    for (label, files) in [
        ("added", &plan.added),
        ("modified", &plan.modified),
        ("removed", &plan.removed),
    ] {
        println!("  {}: {}", label, files.len());
        for file in files {
            println!("    {}", file);
        }
    }
    println!("  unchanged: {}", plan.unchanged.len());
    if !plan.unreadable.is_empty() {
        println!("  unreadable: {}", plan.unreadable.len());
        for failure in &plan.unreadable {
            println!("    {}: {}", failure.filename, failure.reason);
        }
    }
    Ok(())
}

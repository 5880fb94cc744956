//! Incremental indexer.
//!
//! One pass diffs the files on disk (`D`) against the filenames recorded in
//! the fingerprint store (`K`):
//!
//! | Condition | Class | Action |
//! |-----------|-------|--------|
//! | `f ∈ D, f ∉ K` | added | chunk, embed, write, commit fingerprint |
//! | `f ∈ D ∩ K`, fingerprint differs | modified | same as added |
//! | `f ∈ D ∩ K`, fingerprint equal | unchanged | skipped, no embedding call |
//! | `f ∈ K, f ∉ D` | removed | delete entries, then fingerprint |
//!
//! Removals run first, one at a time. Added and modified files are then
//! processed on a bounded worker pool, one file per unit of work. A unit
//! either fully lands (entries replaced, then fingerprint committed) or
//! leaves the file's prior entries and fingerprint in place.
//!
//! Per-file failures are collected into the [`ReindexReport`]. Fatal errors
//! ([`IndexError::is_fatal`]) stop new files from starting; in-flight files
//! finish and the pass returns the error.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use code_index_core::chunk::{chunk_text, ChunkConfig};
use code_index_core::models::{FileFailure, IndexEntry, ReindexReport, SourceFile};
use code_index_core::source::{SourceListing, SourceTree};
use code_index_core::store::{FingerprintStore, IndexStore};
use code_index_core::{IndexError, Result};

use crate::embedding::EmbeddingClient;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Cooperative cancellation for a reindex pass, checked before each file.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChange {
    Added,
    Modified,
    Unchanged,
}

/// What a pass would do, computed without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexPlan {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub unreadable: Vec<FileFailure>,
}

enum FileOutcome {
    Unchanged,
    Indexed { change: FileChange, chunks: usize },
}

#[derive(Clone)]
pub struct Indexer {
    source: Arc<dyn SourceTree>,
    chunk_config: ChunkConfig,
    embedder: EmbeddingClient,
    index: Arc<dyn IndexStore>,
    fingerprints: Arc<dyn FingerprintStore>,
    concurrency: usize,
    cancel: CancelFlag,
    progress: Arc<dyn ProgressReporter>,
}

impl Indexer {
    pub fn new(
        source: Arc<dyn SourceTree>,
        chunk_config: ChunkConfig,
        embedder: EmbeddingClient,
        index: Arc<dyn IndexStore>,
        fingerprints: Arc<dyn FingerprintStore>,
    ) -> Self {
        Self {
            source,
            chunk_config,
            embedder,
            index,
            fingerprints,
            concurrency: 1,
            cancel: CancelFlag::new(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Number of files processed in parallel (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Classify every file without chunking, embedding, or writing.
    pub async fn plan(&self) -> Result<IndexPlan> {
        let listing = self.source.list_files()?;
        let known = self.fingerprints.list_known_filenames().await?;

        let mut plan = IndexPlan {
            removed: removed_files(&listing, &known),
            unreadable: listing.unreadable,
            ..IndexPlan::default()
        };
        for path in listing.files {
            match self.classify(&path).await {
                Ok((FileChange::Added, _)) => plan.added.push(path),
                Ok((FileChange::Modified, _)) => plan.modified.push(path),
                Ok((FileChange::Unchanged, _)) => plan.unchanged.push(path),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => plan.unreadable.push(FileFailure {
                    filename: path,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(plan)
    }

    /// Run one incremental pass.
    ///
    /// Returns `Err` only for fatal errors; per-file failures are reported.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        self.check_dimension().await?;

        self.progress.report(ProgressEvent::Discovering);
        let listing = self.source.list_files()?;
        let known = self.fingerprints.list_known_filenames().await?;
        let removed = removed_files(&listing, &known);
        let on_disk = listing.files;

        tracing::info!(
            files = on_disk.len(),
            known = known.len(),
            removed = removed.len(),
            concurrency = self.concurrency,
            "starting reindex"
        );

        let mut report = ReindexReport::default();
        for failure in listing.unreadable {
            tracing::warn!(
                path = %failure.filename,
                reason = %failure.reason,
                "unreadable path, prior entries kept"
            );
            report.failures.push(failure);
        }
        let total = (removed.len() + on_disk.len()) as u64;
        let mut done = 0u64;

        for path in removed {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            match self.remove_file(&path).await {
                Ok(entries) => {
                    tracing::debug!(file = %path, entries, "removed");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "failed to remove file from index");
                    report.record_failure(path, e);
                }
            }
            done += 1;
            self.progress.report(ProgressEvent::Indexing { n: done, total });
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(String, Result<FileOutcome>)> = JoinSet::new();
        let mut fatal: Option<IndexError> = None;

        for path in on_disk {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(IndexError::storage)?;

            while let Some(joined) = tasks.try_join_next() {
                done += 1;
                self.record_outcome(joined, &mut report, &mut fatal)?;
                self.progress.report(ProgressEvent::Indexing { n: done, total });
            }
            if fatal.is_some() {
                break;
            }
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = this.index_file(&path).await;
                (path, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            done += 1;
            self.record_outcome(joined, &mut report, &mut fatal)?;
            self.progress.report(ProgressEvent::Indexing { n: done, total });
        }

        if let Some(e) = fatal {
            tracing::error!(error = %e, "reindex aborted");
            return Err(e);
        }

        tracing::info!(
            added = report.added,
            modified = report.modified,
            removed = report.removed,
            unchanged = report.unchanged,
            chunks_embedded = report.chunks_embedded,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "reindex complete"
        );
        Ok(report)
    }

    fn record_outcome(
        &self,
        joined: std::result::Result<(String, Result<FileOutcome>), tokio::task::JoinError>,
        report: &mut ReindexReport,
        fatal: &mut Option<IndexError>,
    ) -> Result<()> {
        let (path, outcome) =
            joined.map_err(|e| IndexError::storage(format!("indexing task failed: {}", e)))?;
        match outcome {
            Ok(FileOutcome::Unchanged) => report.unchanged += 1,
            Ok(FileOutcome::Indexed { change, chunks }) => {
                match change {
                    FileChange::Added => report.added += 1,
                    FileChange::Modified => report.modified += 1,
                    FileChange::Unchanged => report.unchanged += 1,
                }
                report.chunks_embedded += chunks;
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(file = %path, error = %e, "fatal indexing error");
                fatal.get_or_insert(e);
            }
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "failed to index file");
                report.record_failure(path, e);
            }
        }
        Ok(())
    }

    /// The provider dimension must match an index that already has one.
    async fn check_dimension(&self) -> Result<()> {
        let dims = self.embedder.dims();
        match self.index.embedding_dim().await? {
            Some(stored) if dims > 0 && stored != dims => Err(IndexError::DimensionMismatch {
                expected: stored,
                actual: dims,
            }),
            _ => Ok(()),
        }
    }

    async fn classify(&self, path: &str) -> Result<(FileChange, SourceFile)> {
        let file = self.source.read_file(path)?;
        let change = match self.fingerprints.get(path).await? {
            None => FileChange::Added,
            Some(stored) if stored == file.content_fingerprint => FileChange::Unchanged,
            Some(_) => FileChange::Modified,
        };
        Ok((change, file))
    }

    async fn remove_file(&self, path: &str) -> Result<usize> {
        let entries = self.index.delete_by_filename(path).await?;
        self.fingerprints.remove(path).await?;
        Ok(entries)
    }

    /// One file's unit of work: chunk, embed, replace entries, commit.
    async fn index_file(&self, path: &str) -> Result<FileOutcome> {
        let (change, file) = self.classify(path).await?;
        if change == FileChange::Unchanged {
            return Ok(FileOutcome::Unchanged);
        }

        let text = std::str::from_utf8(&file.content).map_err(|e| IndexError::read(path, e))?;
        let chunks = chunk_text(path, text, &self.chunk_config, Some(&file.extension));
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
            .collect();

        let prior = self.index.entries_for_file(path).await?;
        self.index.replace_file(path, &entries).await?;

        if let Err(e) = self
            .fingerprints
            .put(path, &file.content_fingerprint)
            .await
        {
            if let Err(rollback) = self.index.replace_file(path, &prior).await {
                tracing::error!(file = %path, error = %rollback, "failed to restore prior entries");
            }
            return Err(e);
        }

        tracing::debug!(file = %path, ?change, chunks = entries.len(), "indexed");
        Ok(FileOutcome::Indexed {
            change,
            chunks: entries.len(),
        })
    }
}

/// Known files that are neither listed nor beneath a path the walk failed on.
fn removed_files(listing: &SourceListing, known: &BTreeSet<String>) -> Vec<String> {
    let present: BTreeSet<&str> = listing.files.iter().map(String::as_str).collect();
    known
        .iter()
        .filter(|f| !present.contains(f.as_str()) && !listing.is_hidden_by_error(f))
        .cloned()
        .collect()
}

//! Core data models used throughout the indexing and search pipeline.
//!
//! [`SourceFile`] and [`Chunk`] are ephemeral: both are re-derived from disk
//! on every pass. [`IndexEntry`] is the only durable entity and is owned by
//! the index store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint_bytes;

/// A file discovered in the source tree, with its raw content.
///
/// Identity is `path`. The fingerprint is recomputed from `content` every
/// time the file is read.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the source root, `/`-separated.
    pub path: String,
    /// Extension including the leading dot (`".rs"`), or empty.
    pub extension: String,
    pub content_fingerprint: String,
    pub size: u64,
    pub modified_time: Option<DateTime<Utc>>,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn from_bytes(
        path: impl Into<String>,
        content: Vec<u8>,
        modified_time: Option<DateTime<Utc>>,
    ) -> Self {
        let path = path.into();
        Self {
            extension: extension_of(&path),
            content_fingerprint: fingerprint_bytes(&content),
            size: content.len() as u64,
            modified_time,
            content,
            path,
        }
    }
}

/// Extract the extension of the final path component, dot included.
///
/// Dotfiles without a further extension (`.gitignore`) have no extension.
pub fn extension_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => name[pos..].to_string(),
    }
}

/// A point in a file: 1-based line number and 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub byte_offset: usize,
}

/// Half-open byte span of a chunk. `end.line` is the line holding the
/// chunk's last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

/// A contiguous, bounded slice of a file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub filename: String,
    pub location: Location,
    pub text: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(&self.filename, self.location.start.byte_offset)
    }
}

/// Primary key of an [`IndexEntry`]: `(filename, start byte offset)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub filename: String,
    pub start_offset: usize,
}

impl ChunkKey {
    pub fn new(filename: impl Into<String>, start_offset: usize) -> Self {
        Self {
            filename: filename.into(),
            start_offset,
        }
    }
}

/// A stored chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub filename: String,
    pub location: Location,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            filename: chunk.filename,
            location: chunk.location,
            text: chunk.text,
            embedding,
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(&self.filename, self.location.start.byte_offset)
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding.len()
    }
}

/// A ranked search result.
///
/// `score` is cosine similarity in `[-1.0, 1.0]`; higher is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub text: String,
    pub score: f32,
    pub start: Position,
    pub end: Position,
}

/// A file that could not be indexed during a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

/// Summary of one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReindexReport {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub chunks_embedded: usize,
    pub failures: Vec<FileFailure>,
    /// True when the pass stopped early at a file boundary.
    pub cancelled: bool,
}

impl ReindexReport {
    pub fn record_failure(&mut self, filename: impl Into<String>, reason: impl ToString) {
        self.failures.push(FileFailure {
            filename: filename.into(),
            reason: reason.to_string(),
        });
    }
}

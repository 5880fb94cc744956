//! Typed errors for the indexing and search pipeline.
//!
//! Per-file kinds ([`IndexError::Read`], [`IndexError::Embedding`]) are
//! collected into a reindex report and never abort a pass. Configuration
//! kinds ([`IndexError::ChunkConfig`], [`IndexError::DimensionMismatch`])
//! abort immediately; see [`IndexError::is_fatal`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid chunk configuration: {0}")]
    ChunkConfig(String),

    #[error("embedding failed: {reason}")]
    Embedding { reason: String, retryable: bool },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("source tree error: {0}")]
    Source(String),
}

impl IndexError {
    pub fn read(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// A failure the caller should not retry (bad request, malformed response).
    pub fn embedding(reason: impl ToString) -> Self {
        Self::Embedding {
            reason: reason.to_string(),
            retryable: false,
        }
    }

    /// A transient failure (rate limit, server error, network) worth retrying.
    pub fn transient_embedding(reason: impl ToString) -> Self {
        Self::Embedding {
            reason: reason.to_string(),
            retryable: true,
        }
    }

    pub fn storage(reason: impl ToString) -> Self {
        Self::Storage(reason.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Embedding {
                retryable: true,
                ..
            }
        )
    }

    /// Whether this error indicates systemic misconfiguration that must
    /// abort an indexing pass rather than fail a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ChunkConfig(_) | Self::DimensionMismatch { .. } | Self::Source(_)
        )
    }
}

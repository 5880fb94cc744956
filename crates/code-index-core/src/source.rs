//! Source tree abstraction.
//!
//! A [`SourceTree`] enumerates the files that should currently be indexed
//! and reads their raw bytes. Include/exclude filtering is the
//! implementation's concern; the indexer only sees the filtered set.

use crate::error::Result;
use crate::models::{FileFailure, SourceFile};

/// Result of enumerating a source tree.
///
/// `unreadable` holds paths (files or whole directories) the walk could not
/// enter. Their contents are unknown for this pass, so previously indexed
/// files at or beneath them must not be treated as removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceListing {
    pub files: Vec<String>,
    pub unreadable: Vec<FileFailure>,
}

impl SourceListing {
    pub fn from_files(files: Vec<String>) -> Self {
        Self {
            files,
            unreadable: Vec::new(),
        }
    }

    /// Whether `path` is an unreadable path or lies beneath one.
    pub fn is_hidden_by_error(&self, path: &str) -> bool {
        self.unreadable.iter().any(|failure| {
            let prefix = failure.filename.as_str();
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

pub trait SourceTree: Send + Sync {
    /// List relative paths of all files that pass the include/exclude
    /// filters, plus any paths the walk could not read. An error here means
    /// the tree itself is unusable (missing root, bad glob) and aborts the
    /// pass.
    fn list_files(&self) -> Result<SourceListing>;

    /// Read one listed file. Failures are per-file `Read` errors.
    fn read_file(&self, path: &str) -> Result<SourceFile>;
}

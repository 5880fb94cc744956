//! Filesystem source tree.
//!
//! Walks a local directory, applying include/exclude glob filters to each
//! path relative to the root. Excluded directories are pruned, so nothing
//! beneath them is visited.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! root = "./src"
//! include_globs = ["*.rs", "*.md"]
//! exclude_globs = ["target", "**/target", "**/.*"]
//! follow_symlinks = false
//! ```
//!
//! Paths are reported `/`-separated and sorted, so listings are stable
//! across platforms and runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use code_index_core::models::{FileFailure, SourceFile};
use code_index_core::source::{SourceListing, SourceTree};
use code_index_core::{IndexError, Result};

use crate::config::SourceConfig;

/// [`SourceTree`] over a directory on local disk.
pub struct FsSourceTree {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FsSourceTree {
    /// Compile the configured globs. A bad pattern is a `Source` error.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&config.exclude_globs)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A walk error scoped to one path below the root. Errors with no path,
    /// or on the root itself, leave the whole listing unknown.
    fn walk_failure(&self, err: &walkdir::Error) -> Result<FileFailure> {
        let rel = err.path().map(|p| self.relative(p)).unwrap_or_default();
        if rel.is_empty() {
            return Err(IndexError::Source(format!(
                "failed to walk {}: {}",
                self.root.display(),
                err
            )));
        }
        Ok(FileFailure {
            reason: IndexError::read(&rel, err).to_string(),
            filename: rel,
        })
    }

    fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl SourceTree for FsSourceTree {
    fn list_files(&self) -> Result<SourceListing> {
        if !self.root.is_dir() {
            return Err(IndexError::Source(format!(
                "source root does not exist or is not a directory: {}",
                self.root.display()
            )));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                !self.exclude.is_match(self.relative(entry.path()))
            });

        let mut listing = SourceListing::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failure = self.walk_failure(&e)?;
                    tracing::warn!(path = %failure.filename, error = %e, "unreadable path");
                    listing.unreadable.push(failure);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = self.relative(entry.path());
            if self.include.is_match(&rel) {
                listing.files.push(rel);
            }
        }

        listing.files.sort();
        listing.unreadable.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(listing)
    }

    fn read_file(&self, path: &str) -> Result<SourceFile> {
        let full = self.root.join(path);
        let content = std::fs::read(&full).map_err(|e| IndexError::read(path, e))?;
        if let Err(e) = std::str::from_utf8(&content) {
            return Err(IndexError::read(path, format!("not valid UTF-8: {}", e)));
        }

        let modified = std::fs::metadata(&full)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(SourceFile::from_bytes(path, content, modified))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::Source(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Source(format!("failed to build glob set: {}", e)))
}

//! # Code Index
//!
//! Incremental semantic indexing and search for a source tree.
//!
//! Files matching the configured globs are split into overlapping chunks,
//! embedded, and stored in SQLite. Each pass re-embeds only files whose
//! content fingerprint changed, and drops entries for files that are gone.
//! Queries embed the query text and rank stored chunks by cosine similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Source tree │──▶│   Indexer    │──▶│    SQLite    │
//! │  walk+glob  │   │ chunk+embed  │   │ entries+fps  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                                      ┌──────▼───────┐
//!                                      │    Search    │
//!                                      │ (cidx CLI)   │
//!                                      └──────────────┘
//! ```
//!
//! Pure logic (chunking, fingerprints, store traits, ranking) lives in the
//! `code-index-core` crate; this crate adds the runtime pieces.
//!
//! ## Quick Start
//!
//! ```bash
//! cidx init                     # create database
//! cidx sources                  # list files that will be indexed
//! cidx reindex                  # index changed files
//! cidx search "open a database connection" --top-k 3
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Filesystem source tree |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite index and fingerprint stores |
//! | [`embedding`] | Embedding providers and batching client |
//! | [`indexer`] | Incremental reindex pass |
//! | [`search`] | Semantic search |
//! | [`ingest`] | `reindex` command wiring |
//! | [`progress`] | Reindex progress reporting |
//! | [`sources`] | `sources` command |
//! | [`stats`] | Index statistics |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod indexer;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sources;
pub mod sqlite_store;
pub mod stats;

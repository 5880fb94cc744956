//! # Code Index Core
//!
//! Runtime-free logic shared by the `code-index` application: the data
//! model, content fingerprinting, the overlapping-window chunker, the
//! embedding provider trait, store abstractions, and result ranking.
//!
//! This crate contains no tokio, sqlx, or filesystem walking. Anything that
//! needs a runtime or a database lives in the application crate and plugs
//! in through the traits defined here.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod search;
pub mod source;
pub mod store;

pub use error::{IndexError, Result};

//! Overlapping-window text chunker.
//!
//! Splits file text into [`Chunk`]s of at most `chunk_size` units, where
//! consecutive chunks share exactly `chunk_overlap` units. A **unit is one
//! Unicode scalar value** (a Rust `char`), not a byte and not a model token.
//! Byte offsets and line numbers are recorded for every chunk so a snippet
//! can be located in the original file.
//!
//! # Algorithm
//!
//! 1. Start the first window at char 0.
//! 2. The window may extend at most `chunk_size` chars. If that reaches the
//!    end of the text, emit the final chunk and stop.
//! 3. Otherwise, when the language hint is recognized, look backwards
//!    for a natural breakpoint: a line end, preferring blank lines, section
//!    starts (Markdown headings, TOML tables), and statement ends (`}`, `;`).
//!    Only breakpoints past the midpoint of the window, and past the
//!    overlap, are considered.
//! 4. Without a recognized hint, or without a breakpoint, cut at exactly
//!    `chunk_size` chars (the fixed-width fallback).
//! 5. The next window starts `chunk_overlap` chars before the cut.
//!
//! The output depends only on `(text, chunk_size, chunk_overlap,
//! language_hint)`, so re-chunking unchanged content reproduces the same
//! boundaries. That property is what makes fingerprint-based skipping safe.
//!
//! # Example
//!
//! ```rust
//! use code_index_core::chunk::{chunk_text, ChunkConfig};
//!
//! let config = ChunkConfig::new(1000, 300).unwrap();
//! let chunks = chunk_text("src/lib.rs", "fn main() {}\n", &config, Some(".rs"));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].location.start.line, 1);
//! ```

use crate::error::{IndexError, Result};
use crate::models::{Chunk, Location, Position};

/// Validated chunk window configuration, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;
    pub const DEFAULT_CHUNK_OVERLAP: usize = 300;

    /// Reject `chunk_size == 0` and `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IndexError::ChunkConfig("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(IndexError::ChunkConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            chunk_overlap: Self::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Languages with known breakpoint rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
    Go,
    Java,
    Toml,
    Markdown,
    Json,
}

impl Language {
    /// Resolve a hint such as `".rs"`, `"rs"`, or `"rust"` (case-insensitive).
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().trim_start_matches('.').to_ascii_lowercase();
        let lang = match hint.as_str() {
            "rs" | "rust" => Self::Rust,
            "py" | "pyi" | "python" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" | "javascript" => Self::JavaScript,
            "ts" | "tsx" | "typescript" => Self::TypeScript,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "c++" => Self::Cpp,
            "go" => Self::Go,
            "java" => Self::Java,
            "toml" => Self::Toml,
            "md" | "markdown" => Self::Markdown,
            "json" => Self::Json,
            _ => return None,
        };
        Some(lang)
    }

    /// Characters that end a statement when they close a line.
    fn terminators(self) -> &'static [char] {
        match self {
            Self::Rust
            | Self::JavaScript
            | Self::TypeScript
            | Self::C
            | Self::Cpp
            | Self::Go
            | Self::Java => &['}', ';'],
            Self::Json => &['}', ']', ','],
            Self::Python | Self::Toml | Self::Markdown => &[],
        }
    }

    /// Characters that open a new section when they start a line.
    fn section_starts(self) -> &'static [char] {
        match self {
            Self::Markdown => &['#'],
            Self::Toml => &['['],
            _ => &[],
        }
    }
}

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector for empty text. Text no longer than
/// `chunk_size` chars yields exactly one chunk covering all of it.
pub fn chunk_text(
    filename: &str,
    text: &str,
    config: &ChunkConfig,
    language_hint: Option<&str>,
) -> Vec<Chunk> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    // newlines_before[i] = number of '\n' in chars[..i]
    let mut newlines_before = Vec::with_capacity(n + 1);
    let mut count = 0usize;
    newlines_before.push(0);
    for &(_, c) in &chars {
        if c == '\n' {
            count += 1;
        }
        newlines_before.push(count);
    }

    let byte_at = |i: usize| if i == n { text.len() } else { chars[i].0 };
    let language = language_hint.and_then(Language::from_hint);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + config.chunk_size).min(n);
        let end = if hard_end == n {
            n
        } else {
            language
                .and_then(|lang| find_breakpoint(&chars, start, hard_end, config, lang))
                .unwrap_or(hard_end)
        };

        let start_byte = byte_at(start);
        let end_byte = byte_at(end);
        chunks.push(Chunk {
            filename: filename.to_string(),
            location: Location {
                start: Position {
                    line: newlines_before[start] + 1,
                    byte_offset: start_byte,
                },
                end: Position {
                    line: newlines_before[end - 1] + 1,
                    byte_offset: end_byte,
                },
            },
            text: text[start_byte..end_byte].to_string(),
        });

        if end == n {
            break;
        }
        start = end - config.chunk_overlap;
    }

    chunks
}

/// Pick the best cut position in `[lower, hard_end]`, where a cut at `p`
/// means the chunk ends just before char `p`. Only positions directly after
/// a newline qualify. Higher-ranked breakpoints win; among equals the latest
/// one wins.
fn find_breakpoint(
    chars: &[(usize, char)],
    start: usize,
    hard_end: usize,
    config: &ChunkConfig,
    lang: Language,
) -> Option<usize> {
    let lower = start + (config.chunk_overlap + 1).max(config.chunk_size / 2);
    if lower > hard_end {
        return None;
    }

    let mut best: Option<(u8, usize)> = None;
    for p in (lower..=hard_end).rev() {
        if chars[p - 1].1 != '\n' {
            continue;
        }
        let prev = if p >= 2 { Some(chars[p - 2].1) } else { None };
        let next = chars.get(p).map(|&(_, c)| c);

        let rank = if prev == Some('\n') || next.is_some_and(|c| lang.section_starts().contains(&c))
        {
            3
        } else if prev.is_some_and(|c| lang.terminators().contains(&c)) {
            2
        } else {
            1
        };

        if best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, p));
            if rank == 3 {
                break;
            }
        }
    }

    best.map(|(_, p)| p)
}

//! Ranking of similarity candidates.
//!
//! Every [`IndexStore`](crate::store::IndexStore) implementation funnels
//! its scored candidates through [`rank_hits`] so that ordering is the same
//! regardless of backend: score descending, then filename ascending, then
//! start offset ascending.

use std::cmp::Ordering;

use crate::models::SearchHit;

/// Default number of results returned by a search.
pub const DEFAULT_TOP_K: usize = 5;

/// Sort `hits` into rank order and keep at most `top_k`.
///
/// Returns all hits when fewer than `top_k` exist.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(compare_hits);
    hits.truncate(top_k);
    hits
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.filename.cmp(&b.filename))
        .then_with(|| a.start.byte_offset.cmp(&b.start.byte_offset))
}

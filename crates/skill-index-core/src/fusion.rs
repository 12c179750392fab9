//! Reciprocal Rank Fusion.
//!
//! Each ranking contributes `1 / (k + rank)` for every item it contains,
//! with 1-based ranks. An item near the top of either ranking scores well
//! even when absent from the other.

use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;

/// One chunk after fusion, with the channel evidence that produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: String,
    pub fused_score: f64,
    /// BM25 score, `0.0` when absent from the lexical ranking.
    pub lexical_score: f64,
    pub lexical_rank: Option<usize>,
    pub semantic_score: Option<f64>,
    pub semantic_rank: Option<usize>,
}

/// Fuse a lexical and a semantic ranking.
///
/// Both inputs must already be sorted best-first. Output is ordered by
/// fused score descending, then lexical score descending, then chunk id.
pub fn fuse(lexical: &[(String, f64)], semantic: &[(String, f64)], k: f64) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<&str, FusedCandidate> = HashMap::new();

    for (i, (id, score)) in lexical.iter().enumerate() {
        let rank = i + 1;
        let entry = by_id.entry(id.as_str()).or_insert_with(|| empty(id));
        entry.fused_score += 1.0 / (k + rank as f64);
        entry.lexical_score = *score;
        entry.lexical_rank = Some(rank);
    }

    for (i, (id, score)) in semantic.iter().enumerate() {
        let rank = i + 1;
        let entry = by_id.entry(id.as_str()).or_insert_with(|| empty(id));
        entry.fused_score += 1.0 / (k + rank as f64);
        entry.semantic_score = Some(*score);
        entry.semantic_rank = Some(rank);
    }

    let mut fused: Vec<FusedCandidate> = by_id.into_values().collect();
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.lexical_score
                    .partial_cmp(&a.lexical_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

fn empty(id: &str) -> FusedCandidate {
    FusedCandidate {
        chunk_id: id.to_string(),
        fused_score: 0.0,
        lexical_score: 0.0,
        lexical_rank: None,
        semantic_score: None,
        semantic_rank: None,
    }
}

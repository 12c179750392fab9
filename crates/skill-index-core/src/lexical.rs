//! BM25 lexical scoring with weighted query terms.
//!
//! Statistics are computed per chunk at index time ([`term_stats`]) and
//! aggregated snapshot-wide ([`LexicalStats`]) so a chunk's score does not
//! depend on which topics survived pruning.
//!
//! ```text
//!                      tf · (k1 + 1)
//! score = Σ w · idf · ─────────────────────────────
//!                      tf + k1 · (1 − b + b · dl / avgdl)
//!
//! idf = ln(1 + (N − df + 0.5) / (df + 0.5))
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Chunk, TermStats};
use crate::tokenize;

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;

/// A query term and its weight: `1.0` for original terms, less for
/// concept-graph expansions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTerm {
    pub term: String,
    pub weight: f64,
}

/// Compute term frequencies for a passage.
pub fn term_stats(text: &str) -> TermStats {
    let mut stats = TermStats::default();
    for term in tokenize::terms(text) {
        *stats.freqs.entry(term).or_insert(0) += 1;
        stats.length += 1;
    }
    stats
}

/// Smoothed BM25 inverse document frequency. Always positive.
pub fn idf(total: usize, df: usize) -> f64 {
    let n = total as f64;
    let df = df as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Document frequencies and average length over a set of chunks.
#[derive(Debug, Clone, Default)]
pub struct LexicalStats {
    pub doc_count: usize,
    pub avg_len: f64,
    pub df: HashMap<String, usize>,
}

impl LexicalStats {
    pub fn build<'a, I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'a Chunk>,
    {
        let mut stats = LexicalStats::default();
        let mut total_len = 0u64;
        for chunk in chunks {
            stats.doc_count += 1;
            total_len += chunk.terms.length as u64;
            for term in chunk.terms.freqs.keys() {
                *stats.df.entry(term.clone()).or_insert(0) += 1;
            }
        }
        if stats.doc_count > 0 {
            stats.avg_len = total_len as f64 / stats.doc_count as f64;
        }
        stats
    }

    pub fn idf(&self, term: &str) -> f64 {
        idf(self.doc_count, self.df.get(term).copied().unwrap_or(0))
    }

    /// BM25 score of one chunk for a weighted query.
    pub fn score(&self, query: &[QueryTerm], terms: &TermStats) -> f64 {
        if self.doc_count == 0 || terms.length == 0 {
            return 0.0;
        }
        let dl = terms.length as f64;
        let avg = if self.avg_len > 0.0 { self.avg_len } else { dl };
        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avg);

        query
            .iter()
            .filter_map(|q| {
                let tf = *terms.freqs.get(&q.term)? as f64;
                Some(q.weight * self.idf(&q.term) * tf * (BM25_K1 + 1.0) / (tf + norm))
            })
            .sum()
    }
}

//! Pairwise reranking.
//!
//! A [`Reranker`] scores `(query, passage)` pairs jointly and returns a
//! relevance in `[0, 1]` per passage. The built-in [`TermOverlapReranker`]
//! needs no model: it rewards passages that contain the query's terms and
//! reproduce its word order.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::tokenize;

#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    /// `false` for the pass-through reranker.
    fn is_enabled(&self) -> bool {
        true
    }
    /// One score in `[0, 1]` per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Share of the score given to query-term coverage; the rest rewards
/// query bigrams that appear adjacent in the passage.
const COVERAGE_WEIGHT: f32 = 0.7;

/// Lexical cross scorer over query terms and ordered term pairs.
///
/// ```text
/// coverage = |query terms ∩ passage terms| / |query terms|
/// order    = |query bigrams ∩ passage bigrams| / |query bigrams|
/// score    = 0.7·coverage + 0.3·order
/// ```
///
/// A single-term query scores on coverage alone.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    pub fn score_pair(query: &str, passage: &str) -> f32 {
        let q_terms = tokenize::unique_terms(query);
        if q_terms.is_empty() {
            return 0.0;
        }
        let p_terms = tokenize::terms(passage);
        let p_set: HashSet<&String> = p_terms.iter().collect();

        let covered = q_terms.iter().filter(|t| p_set.contains(t)).count();
        let coverage = covered as f32 / q_terms.len() as f32;

        let q_bigrams: HashSet<(String, String)> =
            tokenize::bigrams(&tokenize::terms(query)).into_iter().collect();
        if q_bigrams.is_empty() {
            return coverage;
        }
        let p_bigrams: HashSet<(String, String)> =
            tokenize::bigrams(&p_terms).into_iter().collect();
        let ordered = q_bigrams.iter().filter(|b| p_bigrams.contains(*b)).count();
        let order = ordered as f32 / q_bigrams.len() as f32;

        COVERAGE_WEIGHT * coverage + (1.0 - COVERAGE_WEIGHT) * order
    }
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        Ok(passages
            .iter()
            .map(|p| Self::score_pair(query, p))
            .collect())
    }
}

/// Pass-through: reranking is skipped and the fused order stands.
#[derive(Debug, Clone, Default)]
pub struct DisabledReranker;

#[async_trait]
impl Reranker for DisabledReranker {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
        Ok(vec![0.0; passages.len()])
    }
}

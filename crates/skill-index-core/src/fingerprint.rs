//! Topic fingerprints and coarse topic pruning.
//!
//! A fingerprint summarizes a topic as a term vocabulary (every chunk term
//! plus the manifest's name, description, domain tags, trigger phrases and
//! example queries) and, when chunk embeddings exist, the normalized mean
//! of its chunk embeddings.
//!
//! # Scoring
//!
//! ```text
//! coverage = min(1, Σ_{t ∈ query ∩ vocab} w(t)·idf(t) / Σ_{t ∈ original} idf(t))
//! semantic = max(0, cos(query_vec, topic_vec))
//! base     = λ·coverage + (1 − λ)·semantic      (coverage alone without vectors)
//! score    = clamp(base + trigger_boost·overlap − penalty·[anti-example], 0, 1)
//! ```
//!
//! `overlap` is `1` when a trigger phrase occurs in the query, either
//! literally or as a run of normalized terms. Otherwise it is the largest
//! share of one trigger's terms found in the query, counted only from half
//! upwards, so "Sendable warning" earns half the boost of a
//! "Sendable conformance" trigger.
//!
//! Topic-level idf uses topic document frequencies; a query term no topic
//! knows is weighed as if one topic knew it, so unknown words lower every
//! topic's coverage.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::embedding::{cosine_similarity, normalize};
use crate::lexical::{idf, QueryTerm};
use crate::models::{Chunk, Topic};
use crate::tokenize;

#[derive(Debug, Clone)]
pub struct TopicFingerprint {
    pub topic_id: String,
    pub vocabulary: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub triggers: Vec<String>,
    /// Scoring terms of each trigger, in trigger order.
    pub trigger_terms: Vec<Vec<String>>,
    pub anti_examples: Vec<String>,
}

/// Smallest share of a trigger's terms that counts as a partial match.
const PARTIAL_TRIGGER_MIN: f64 = 0.5;

/// Pruning knobs, decoupled from application config.
#[derive(Debug, Clone)]
pub struct PruneParams {
    /// Maximum topics kept by score (trigger matches are kept regardless).
    pub top_k: usize,
    /// λ: share of the lexical coverage in the base score.
    pub lexical_weight: f64,
    pub trigger_boost: f64,
    pub anti_example_penalty: f64,
}

/// Per-topic pruning result, also reported by `explain`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicScore {
    pub topic_id: String,
    /// Final pruning score in `[0, 1]`.
    pub score: f64,
    pub coverage: f64,
    pub semantic: f64,
    pub trigger_matched: bool,
    /// Share of the trigger boost applied, in `[0, 1]`.
    pub trigger_overlap: f64,
    pub anti_example_matched: bool,
}

/// Fingerprints plus the topic-level document frequencies used for idf.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    pub fingerprints: Vec<TopicFingerprint>,
    topic_df: HashMap<String, usize>,
}

impl FingerprintIndex {
    /// Build fingerprints for `topics` from their chunks. Topics are kept
    /// in the given order.
    pub fn build(topics: &[Topic], chunks: &[Chunk]) -> Self {
        let mut by_topic: HashMap<&str, Vec<&Chunk>> = HashMap::new();
        for chunk in chunks {
            by_topic.entry(chunk.topic_id.as_str()).or_default().push(chunk);
        }

        let mut fingerprints = Vec::with_capacity(topics.len());
        let mut topic_df: HashMap<String, usize> = HashMap::new();

        for topic in topics {
            let members = by_topic.get(topic.id.as_str()).cloned().unwrap_or_default();

            let mut vocabulary: BTreeSet<String> = tokenize::terms(&topic.manifest_text())
                .into_iter()
                .collect();
            for chunk in &members {
                vocabulary.extend(chunk.terms.freqs.keys().cloned());
            }
            for term in &vocabulary {
                *topic_df.entry(term.clone()).or_insert(0) += 1;
            }

            fingerprints.push(TopicFingerprint {
                topic_id: topic.id.clone(),
                vocabulary,
                embedding: mean_embedding(&members),
                triggers: topic.triggers.clone(),
                trigger_terms: topic
                    .triggers
                    .iter()
                    .map(|t| tokenize::unique_terms(t))
                    .collect(),
                anti_examples: topic.anti_examples.clone(),
            });
        }

        Self {
            fingerprints,
            topic_df,
        }
    }

    pub fn fingerprint(&self, topic_id: &str) -> Option<&TopicFingerprint> {
        self.fingerprints.iter().find(|f| f.topic_id == topic_id)
    }

    /// The part of `query` that `topic_id` is asked to answer.
    ///
    /// A word is dropped when its term is unknown to the topic but known to
    /// another of `candidates`. Words no candidate knows stay, so they
    /// count against every topic.
    pub fn focus_query(&self, query: &str, topic_id: &str, candidates: &[&str]) -> String {
        let Some(own) = self.fingerprint(topic_id) else {
            return query.to_string();
        };
        let others: Vec<&TopicFingerprint> = candidates
            .iter()
            .filter(|id| **id != topic_id)
            .filter_map(|id| self.fingerprint(id))
            .collect();

        tokenize::words(query)
            .into_iter()
            .filter(|word| match tokenize::normalize_term(word) {
                Some(term) => {
                    own.vocabulary.contains(&term)
                        || !others.iter().any(|f| f.vocabulary.contains(&term))
                }
                None => true,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn topic_idf(&self, term: &str) -> f64 {
        let df = self.topic_df.get(term).copied().unwrap_or(0).max(1);
        idf(self.fingerprints.len(), df)
    }

    /// Score every topic for the query.
    ///
    /// `query_terms` is the weighted (expanded) query; terms with weight
    /// `1.0` count as original terms for the coverage denominator.
    pub fn score_all(
        &self,
        query: &str,
        query_terms: &[QueryTerm],
        query_vec: Option<&[f32]>,
        params: &PruneParams,
    ) -> Vec<TopicScore> {
        let query_words = tokenize::words(query);
        let query_term_seq = tokenize::terms(query);
        let query_term_set: HashSet<&str> = query_term_seq.iter().map(String::as_str).collect();
        let denominator: f64 = query_terms
            .iter()
            .filter(|q| q.weight >= 1.0)
            .map(|q| self.topic_idf(&q.term))
            .sum();

        self.fingerprints
            .iter()
            .map(|fp| {
                let coverage = if denominator > 0.0 {
                    let matched: f64 = query_terms
                        .iter()
                        .filter(|q| fp.vocabulary.contains(&q.term))
                        .map(|q| q.weight * self.topic_idf(&q.term))
                        .sum();
                    (matched / denominator).min(1.0)
                } else {
                    0.0
                };

                let semantic = match (query_vec, fp.embedding.as_deref()) {
                    (Some(q), Some(t)) => Some(cosine_similarity(q, t).max(0.0) as f64),
                    _ => None,
                };

                let base = match semantic {
                    Some(s) => params.lexical_weight * coverage + (1.0 - params.lexical_weight) * s,
                    None => coverage,
                };

                let trigger_matched = fp.triggers.iter().zip(&fp.trigger_terms).any(|(t, terms)| {
                    tokenize::contains_phrase(&query_words, t)
                        || contains_run(&query_term_seq, terms)
                });
                let trigger_overlap = if trigger_matched {
                    1.0
                } else {
                    fp.trigger_terms
                        .iter()
                        .map(|terms| term_share(&query_term_set, terms))
                        .filter(|share| *share >= PARTIAL_TRIGGER_MIN)
                        .fold(0.0, f64::max)
                };
                let anti_example_matched = fp
                    .anti_examples
                    .iter()
                    .any(|t| tokenize::contains_phrase(&query_words, t));

                let mut score = base + params.trigger_boost * trigger_overlap;
                if anti_example_matched {
                    score -= params.anti_example_penalty;
                }

                TopicScore {
                    topic_id: fp.topic_id.clone(),
                    score: score.clamp(0.0, 1.0),
                    coverage,
                    semantic: semantic.unwrap_or(0.0),
                    trigger_matched,
                    trigger_overlap,
                    anti_example_matched,
                }
            })
            .collect()
    }

    /// Rank topics and keep the top `K` with a positive score, plus every
    /// trigger-matched topic.
    pub fn prune(
        &self,
        query: &str,
        query_terms: &[QueryTerm],
        query_vec: Option<&[f32]>,
        params: &PruneParams,
    ) -> Vec<TopicScore> {
        let mut scores = self.score_all(query, query_terms, query_vec, params);
        sort_scores(&mut scores);

        let mut kept = 0usize;
        scores
            .into_iter()
            .filter(|s| {
                if kept < params.top_k && s.score > 0.0 {
                    kept += 1;
                    true
                } else {
                    s.trigger_matched
                }
            })
            .collect()
    }
}

/// Score descending, then topic id ascending.
pub fn sort_scores(scores: &mut [TopicScore]) {
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn term_share(query: &HashSet<&str>, trigger: &[String]) -> f64 {
    if trigger.is_empty() {
        return 0.0;
    }
    let found = trigger.iter().filter(|t| query.contains(t.as_str())).count();
    found as f64 / trigger.len() as f64
}

fn mean_embedding(chunks: &[&Chunk]) -> Option<Vec<f32>> {
    let mut sum: Option<Vec<f32>> = None;
    for emb in chunks.iter().filter_map(|c| c.embedding.as_ref()) {
        match sum.as_mut() {
            None => sum = Some(emb.clone()),
            Some(acc) if acc.len() == emb.len() => {
                for (a, x) in acc.iter_mut().zip(emb) {
                    *a += x;
                }
            }
            Some(_) => {}
        }
    }
    sum.map(|v| normalize(&v))
}

//! Confidence tiers and budget shaping.
//!
//! The shaper turns the reranked candidate list into the final result:
//! it rates each topic, classifies the top topic's score into a
//! [`ConfidenceTier`], picks the topics that tier allows, and fills the
//! result greedily (primary topic first, best chunk first) under three
//! caps: chunks per topic, total chunks and total tokens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Confident,
    Uncertain,
    Gap,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::Confident => "confident",
            ConfidenceTier::Uncertain => "uncertain",
            ConfidenceTier::Gap => "gap",
        };
        f.write_str(s)
    }
}

/// Tier thresholds on the 0–100 scale. Lower bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub confident: f64,
    pub uncertain: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confident: 70.0,
            uncertain: 50.0,
        }
    }
}

/// `score >= confident` → Confident, `score >= uncertain` → Uncertain,
/// otherwise Gap.
pub fn classify(score: f64, thresholds: &Thresholds) -> ConfidenceTier {
    if score >= thresholds.confident {
        ConfidenceTier::Confident
    } else if score >= thresholds.uncertain {
        ConfidenceTier::Uncertain
    } else {
        ConfidenceTier::Gap
    }
}

/// Topic confidence on the 0–100 scale.
///
/// With a rerank signal: `100 · prune^(1−w) · rerank^w`. Without one
/// (reranker disabled or failed), the prune score alone.
pub fn topic_confidence(prune: f64, best_rerank: Option<f64>, rerank_weight: f64) -> f64 {
    let prune = prune.clamp(0.0, 1.0);
    let value = match best_rerank {
        Some(r) => prune.powf(1.0 - rerank_weight) * r.clamp(0.0, 1.0).powf(rerank_weight),
        None => prune,
    };
    100.0 * value
}

/// Size caps applied to the final result.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub max_chunks_per_topic: usize,
    pub max_total_chunks: usize,
    pub max_total_tokens: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_chunks_per_topic: 3,
            max_total_chunks: 6,
            max_total_tokens: 5000,
        }
    }
}

/// A reranked candidate as seen by the shaper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub topic_id: String,
    pub score: f64,
    pub token_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedTopic {
    pub topic_id: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shaped {
    pub chunks: Vec<ScoredChunk>,
    pub tier: ConfidenceTier,
    pub flagged_gap: bool,
    /// Topics that contributed, primary first.
    pub topics: Vec<String>,
    pub top_confidence: f64,
}

/// Shape `ranked` (best first) into the final result.
///
/// `topics` must be sorted by confidence, best first. Confident returns
/// every topic at or above the confident threshold; Uncertain adds the
/// second-ranked topic to the primary; Gap returns nothing. A chunk that
/// would break a cap is dropped and the next one is tried.
pub fn shape(
    ranked: &[ScoredChunk],
    topics: &[RatedTopic],
    thresholds: &Thresholds,
    budget: &Budget,
) -> Shaped {
    let top_confidence = topics.first().map(|t| t.confidence).unwrap_or(0.0);
    let tier = classify(top_confidence, thresholds);

    let selected: Vec<&str> = match tier {
        ConfidenceTier::Confident => topics
            .iter()
            .filter(|t| t.confidence >= thresholds.confident)
            .map(|t| t.topic_id.as_str())
            .collect(),
        ConfidenceTier::Uncertain => topics.iter().take(2).map(|t| t.topic_id.as_str()).collect(),
        ConfidenceTier::Gap => Vec::new(),
    };

    let mut chunks = Vec::new();
    let mut used_tokens = 0usize;
    let mut per_topic: HashMap<&str, usize> = HashMap::new();
    let mut contributing = Vec::new();

    for &topic_id in &selected {
        for candidate in ranked.iter().filter(|c| c.topic_id == topic_id) {
            if chunks.len() >= budget.max_total_chunks {
                break;
            }
            let taken = per_topic.get(topic_id).copied().unwrap_or(0);
            if taken >= budget.max_chunks_per_topic {
                break;
            }
            if used_tokens + candidate.token_count > budget.max_total_tokens {
                continue;
            }
            used_tokens += candidate.token_count;
            per_topic.insert(topic_id, taken + 1);
            chunks.push(candidate.clone());
        }
        if per_topic.contains_key(topic_id) {
            contributing.push(topic_id.to_string());
        }
    }

    Shaped {
        chunks,
        tier,
        flagged_gap: tier == ConfidenceTier::Gap,
        topics: contributing,
        top_confidence,
    }
}

/// Rank topics by confidence, best first, ties by topic id.
pub fn rate_topics(confidences: HashMap<String, f64>) -> Vec<RatedTopic> {
    let mut rated: Vec<RatedTopic> = confidences
        .into_iter()
        .map(|(topic_id, confidence)| RatedTopic {
            topic_id,
            confidence,
        })
        .collect();
    rated.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    rated
}

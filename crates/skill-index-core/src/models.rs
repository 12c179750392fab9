//! Core data models shared by the indexer and the query path.
//!
//! - [`Topic`]: a subject area ("skill") with the routing metadata the
//!   pruner reasons about.
//! - [`DocumentRecord`]: one indexed source file and the hash used for
//!   change detection.
//! - [`Chunk`]: a bounded passage of a document; the retrieval unit.
//! - [`TermStats`]: per-chunk term frequencies for lexical scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named subject area. Read from the topic's manifest; never mutated
/// by the query path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Topic {
    /// Directory name of the topic under its corpus root.
    pub id: String,
    /// Display name (falls back to `id`).
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Declared domain tags.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Phrases that route a query to this topic when they occur literally.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Example queries the topic answers well.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Phrases that resemble a match but should be penalized.
    #[serde(default)]
    pub anti_examples: Vec<String>,
}

impl Topic {
    /// A topic with no manifest: its name and only domain tag are the id.
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            domains: vec![id.to_string()],
            ..Default::default()
        }
    }

    /// Text describing the topic itself, used for its fingerprint vocabulary.
    pub fn manifest_text(&self) -> String {
        let mut parts = vec![self.name.clone(), self.description.clone()];
        parts.extend(self.domains.iter().cloned());
        parts.extend(self.triggers.iter().cloned());
        parts.extend(self.examples.iter().cloned());
        parts.join("\n")
    }
}

/// Change-detection record for one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// `"<topic_id>/<relative path>"`.
    pub id: String,
    pub topic_id: String,
    /// Absolute path of the source file at index time.
    pub path: String,
    /// SHA-256 of the raw file bytes.
    pub hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// Term-frequency statistics for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TermStats {
    pub freqs: BTreeMap<String, u32>,
    /// Number of terms after normalization (BM25 document length).
    pub length: u32,
}

/// A bounded-size passage extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic UUIDv5 of document id, index and text hash.
    pub id: String,
    pub document_id: String,
    pub topic_id: String,
    pub chunk_index: i64,
    /// Heading the passage sits under, or `"intro"`.
    pub section: String,
    pub text: String,
    /// Estimated tokens; never exceeds the configured cap.
    pub token_count: usize,
    /// SHA-256 of `text`.
    pub hash: String,
    /// Contextual embedding, absent when the provider was unavailable.
    pub embedding: Option<Vec<f32>>,
    pub terms: TermStats,
}

/// Contextual text used for embedding and reranking a chunk: the passage
/// prefixed with its topic name and section label.
pub fn contextual_text(topic_name: &str, section: &str, text: &str) -> String {
    format!("[{} | {}]\n{}", topic_name, section, text)
}

//! Immutable, versioned index snapshot.
//!
//! A [`Snapshot`] owns everything the query path reads: topics, document
//! hash records, chunks, and the statistics derived from them. It is built
//! once by the indexer (or loaded from disk) and never mutated afterwards;
//! the engine publishes a new one with a pointer swap.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::fingerprint::FingerprintIndex;
use crate::lexical::LexicalStats;
use crate::models::{Chunk, DocumentRecord, Topic};

#[derive(Debug, Clone)]
pub struct Snapshot {
    /// 0 for a corpus that has never been indexed.
    pub version: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub embedding_model: String,
    /// Sorted by id.
    pub topics: Vec<Topic>,
    pub documents: BTreeMap<String, DocumentRecord>,
    /// Sorted by document id, then chunk index.
    pub chunks: Vec<Chunk>,
    pub lexical: LexicalStats,
    pub fingerprints: FingerprintIndex,
    chunk_pos: HashMap<String, usize>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::assemble(0, None, "disabled".to_string(), Vec::new(), BTreeMap::new(), Vec::new())
    }

    /// Build a snapshot and derive its statistics.
    pub fn assemble(
        version: u64,
        published_at: Option<DateTime<Utc>>,
        embedding_model: String,
        mut topics: Vec<Topic>,
        documents: BTreeMap<String, DocumentRecord>,
        mut chunks: Vec<Chunk>,
    ) -> Self {
        topics.sort_by(|a, b| a.id.cmp(&b.id));
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });

        let lexical = LexicalStats::build(&chunks);
        let fingerprints = FingerprintIndex::build(&topics, &chunks);
        let chunk_pos = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        Self {
            version,
            published_at,
            embedding_model,
            topics,
            documents,
            chunks,
            lexical,
            fingerprints,
            chunk_pos,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunk_pos.get(id).map(|&i| &self.chunks[i])
    }

    pub fn topic(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn topic_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.topic(id).map(|t| t.name.as_str()).unwrap_or(id)
    }

    /// Chunks belonging to any of `topic_ids`.
    pub fn chunks_in_topics(&self, topic_ids: &HashSet<&str>) -> Vec<&Chunk> {
        self.chunks
            .iter()
            .filter(|c| topic_ids.contains(c.topic_id.as_str()))
            .collect()
    }

    pub fn chunks_of_document(&self, document_id: &str) -> impl Iterator<Item = &Chunk> {
        let document_id = document_id.to_string();
        self.chunks
            .iter()
            .filter(move |c| c.document_id == document_id)
    }

    pub fn embedded_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.embedding.is_some()).count()
    }

    /// Every chunk points at a recorded document of the same topic.
    pub fn is_consistent(&self) -> bool {
        self.chunks.iter().all(|c| {
            self.documents
                .get(&c.document_id)
                .is_some_and(|d| d.topic_id == c.topic_id)
        })
    }
}

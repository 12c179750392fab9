//! Incremental snapshot builder.
//!
//! Builds the next [`Snapshot`] from the previous one and a corpus scan:
//!
//! 1. Scan the in-scope part of the corpus and hash every document.
//! 2. Carry over unchanged documents (same hash, same topic) with their
//!    chunks; carry over everything outside the scope untouched.
//! 3. Rechunk new and modified documents in parallel (rayon).
//! 4. Embed every chunk that lacks a vector under the active model, in
//!    batches. A failed batch leaves its chunks without embeddings.
//! 5. Compare with the previous snapshot; return a new version only when
//!    something changed.
//!
//! Persisting and publishing the result is the engine's job.

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use skill_index_core::chunk::chunk_document;
use skill_index_core::embedding::EmbeddingProvider;
use skill_index_core::models::{contextual_text, Chunk, DocumentRecord, Topic};
use skill_index_core::snapshot::Snapshot;

use crate::config::Config;
use crate::corpus::{Corpus, Scope, SourceDocument};
use crate::error::{EngineError, Result};
use crate::progress::{IndexProgressEvent, IndexProgressReporter};

/// Outcome of one reindex run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    /// New or modified documents chunked in this run.
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub documents_unchanged: usize,
    pub documents_removed: usize,
    pub chunks_embedded: usize,
    pub snapshot_version: u64,
    /// `false` when nothing changed and the previous snapshot stands.
    pub published: bool,
    pub errors: Vec<String>,
}

/// Everything the indexer needs besides the snapshots themselves.
pub struct IndexContext<'a> {
    pub config: &'a Config,
    pub corpus: &'a Corpus,
    pub embedder: &'a dyn EmbeddingProvider,
    pub progress: &'a dyn IndexProgressReporter,
}

/// Build the snapshot that follows `previous` for `scope`.
///
/// Returns `None` (and a report carrying the previous version) when the
/// result would be identical to `previous`.
pub async fn build_next(
    ctx: &IndexContext<'_>,
    previous: &Snapshot,
    scope: &Scope,
) -> Result<(Option<Snapshot>, ReindexReport)> {
    let mut report = ReindexReport::default();

    ctx.progress.report(IndexProgressEvent::Discovering);
    let scan = ctx.corpus.scan(scope);
    for err in scan.errors {
        warn!(error = %err, "skipping document");
        report.documents_skipped += 1;
        report.errors.push(err.to_string());
    }

    let scanned: HashSet<&str> = scan.documents.iter().map(|d| d.id.as_str()).collect();
    let mut documents: BTreeMap<String, DocumentRecord> = BTreeMap::new();
    let mut chunks: Vec<Chunk> = Vec::new();

    // Outside the scope, or in scope and unchanged: carried over.
    for (id, record) in &previous.documents {
        if !scope.contains(Path::new(&record.path)) {
            documents.insert(id.clone(), record.clone());
            chunks.extend(previous.chunks_of_document(id).cloned());
        } else if !scanned.contains(id.as_str()) {
            report.documents_removed += 1;
            debug!(document = %id, "document removed");
        }
    }

    let mut changed: Vec<&SourceDocument> = Vec::new();
    for doc in &scan.documents {
        match previous.documents.get(&doc.id) {
            Some(prev) if prev.hash == doc.hash && prev.topic_id == doc.topic_id => {
                report.documents_unchanged += 1;
                documents.insert(doc.id.clone(), prev.clone());
                chunks.extend(previous.chunks_of_document(&doc.id).cloned());
            }
            _ => changed.push(doc),
        }
    }

    let max_tokens = ctx.config.chunking.max_tokens;
    let rechunked: Vec<(&SourceDocument, Result<Vec<Chunk>>)> = changed
        .par_iter()
        .map(|doc| {
            let result = doc
                .body()
                .map(|body| chunk_document(&doc.id, &doc.topic_id, body, max_tokens));
            (*doc, result)
        })
        .collect();

    let indexed_at = Utc::now();
    for (doc, result) in rechunked {
        match result {
            Ok(doc_chunks) => {
                report.documents_indexed += 1;
                documents.insert(
                    doc.id.clone(),
                    DocumentRecord {
                        id: doc.id.clone(),
                        topic_id: doc.topic_id.clone(),
                        path: doc.path.display().to_string(),
                        hash: doc.hash.clone(),
                        indexed_at,
                    },
                );
                chunks.extend(doc_chunks);
            }
            Err(err) => {
                warn!(error = %err, "skipping document");
                report.documents_skipped += 1;
                report.errors.push(err.to_string());
            }
        }
    }

    let topics = resolve_topics(&scan.topics, previous, &documents);

    let embedding_model = if ctx.embedder.is_enabled() {
        ctx.embedder.model_name().to_string()
    } else {
        "disabled".to_string()
    };
    let model_changed = embedding_model != previous.embedding_model;
    let renamed: HashSet<&str> = topics
        .iter()
        .filter(|t| previous.topic(&t.id).is_some_and(|p| p.name != t.name))
        .map(|t| t.id.as_str())
        .collect();

    if model_changed || !ctx.embedder.is_enabled() {
        for chunk in &mut chunks {
            chunk.embedding = None;
        }
    } else {
        for chunk in chunks.iter_mut().filter(|c| renamed.contains(c.topic_id.as_str())) {
            chunk.embedding = None;
        }
    }

    if ctx.embedder.is_enabled() {
        report.chunks_embedded = embed_missing(ctx, &topics, &mut chunks, &mut report.errors).await;
    }

    let next = Snapshot::assemble(
        previous.version + 1,
        Some(Utc::now()),
        embedding_model,
        topics,
        documents,
        chunks,
    );

    if same_content(previous, &next) {
        report.snapshot_version = previous.version;
        info!(version = previous.version, "index unchanged");
        return Ok((None, report));
    }

    report.snapshot_version = next.version;
    report.published = true;
    info!(
        version = next.version,
        indexed = report.documents_indexed,
        unchanged = report.documents_unchanged,
        removed = report.documents_removed,
        skipped = report.documents_skipped,
        embedded = report.chunks_embedded,
        "built snapshot"
    );
    Ok((Some(next), report))
}

/// Topics that own at least one document. A topic whose directory is
/// outside the scan (or gone) keeps its previous manifest.
fn resolve_topics(
    scanned: &[Topic],
    previous: &Snapshot,
    documents: &BTreeMap<String, DocumentRecord>,
) -> Vec<Topic> {
    let used: HashSet<&str> = documents.values().map(|d| d.topic_id.as_str()).collect();
    let by_id: HashMap<&str, &Topic> = scanned.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut topics: Vec<Topic> = used
        .into_iter()
        .map(|id| {
            by_id
                .get(id)
                .map(|t| (*t).clone())
                .or_else(|| previous.topic(id).cloned())
                .unwrap_or_else(|| Topic::bare(id))
        })
        .collect();
    topics.sort_by(|a, b| a.id.cmp(&b.id));
    topics
}

/// Embed every chunk without a vector. Returns the number embedded.
async fn embed_missing(
    ctx: &IndexContext<'_>,
    topics: &[Topic],
    chunks: &mut [Chunk],
    errors: &mut Vec<String>,
) -> usize {
    let names: HashMap<&str, &str> = topics
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let pending: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.embedding.is_none())
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let batch_size = ctx.config.embedding.batch_size.max(1);
    let total = pending.len() as u64;
    let mut embedded = 0usize;
    let mut done = 0u64;

    for batch in pending.chunks(batch_size) {
        let texts: Vec<String> = batch
            .iter()
            .map(|&i| {
                let c = &chunks[i];
                let name = names.get(c.topic_id.as_str()).copied().unwrap_or(c.topic_id.as_str());
                contextual_text(name, &c.section, &c.text)
            })
            .collect();

        match ctx.embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (&i, v) in batch.iter().zip(vectors) {
                    chunks[i].embedding = Some(v);
                }
                embedded += batch.len();
            }
            Ok(vectors) => {
                let err = EngineError::EmbeddingProvider(format!(
                    "{} returned {} vectors for {} texts",
                    ctx.embedder.model_name(),
                    vectors.len(),
                    batch.len()
                ));
                warn!(error = %err, "embedding batch failed, chunks left without vectors");
                errors.push(err.to_string());
            }
            Err(e) => {
                let err = EngineError::EmbeddingProvider(e.to_string());
                warn!(error = %err, "embedding batch failed, chunks left without vectors");
                errors.push(err.to_string());
            }
        }

        done += batch.len() as u64;
        ctx.progress
            .report(IndexProgressEvent::Indexing { n: done, total });
    }

    embedded
}

/// Whether two snapshots serve identical content. The embedding model
/// only matters when there is something embedded under it.
fn same_content(a: &Snapshot, b: &Snapshot) -> bool {
    let model_differs = a.embedding_model != b.embedding_model && !b.chunks.is_empty();
    if model_differs
        || a.topics != b.topics
        || a.chunks.len() != b.chunks.len()
        || a.documents.len() != b.documents.len()
    {
        return false;
    }
    let docs_equal = a
        .documents
        .iter()
        .zip(&b.documents)
        .all(|((ka, da), (kb, db))| ka == kb && da.hash == db.hash && da.topic_id == db.topic_id);
    docs_equal
        && a
            .chunks
            .iter()
            .zip(&b.chunks)
            .all(|(x, y)| x.id == y.id && x.embedding.is_some() == y.embedding.is_some())
}

//! The retrieval engine facade.
//!
//! [`Engine`] owns the published snapshot and wires the query pipeline:
//!
//! ```text
//! query
//!   → concept expansion          (weighted query terms)
//!   → fingerprint pruning        (≤ K topics)
//!   → BM25 ∥ cosine → RRF        (fused candidates)
//!   → rerank top N               (pairwise relevance)
//!   → topic confidence → tier → budget shaping
//!   → cache
//! ```
//!
//! # Concurrency
//!
//! Queries clone the current `Arc<Snapshot>` under a short read lock and
//! never block on indexing. Reindexing is serialized by an async mutex;
//! the writer builds the next snapshot off to the side, persists it, then
//! swaps the pointer. Each query runs under `retrieval.query_timeout_ms`.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use skill_index_core::chunk::CHARS_PER_TOKEN;
use skill_index_core::concepts::{weighted_query, ConceptGraph, Expansion};
use skill_index_core::embedding::EmbeddingProvider;
use skill_index_core::fingerprint::{PruneParams, TopicScore};
use skill_index_core::fusion::FusedCandidate;
use skill_index_core::lexical::QueryTerm;
use skill_index_core::models::contextual_text;
use skill_index_core::rerank::Reranker;
use skill_index_core::retrieve::{retrieve, RetrieveParams};
use skill_index_core::shape::{
    rate_topics, shape, topic_confidence, Budget, ConfidenceTier, RatedTopic, ScoredChunk,
    Thresholds,
};
use skill_index_core::snapshot::Snapshot;

use crate::cache::{CacheKey, QueryCache};
use crate::concepts;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::{create_provider, embed_query};
use crate::error::{EngineError, Result};
use crate::indexer::{self, IndexContext, ReindexReport};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::rerank::create_reranker;
use crate::store::Store;

/// One returned passage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub topic_id: String,
    pub document_id: String,
    pub section: String,
    pub text: String,
    /// Rerank score, or the fused score when reranking was skipped.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub tier: ConfidenceTier,
    pub flagged_gap: bool,
    /// Confidence of the primary topic, 0–100.
    pub confidence: f64,
    /// Topics that contributed results, primary first.
    pub topics_used: Vec<String>,
    pub expanded_terms: Vec<String>,
    /// The query ran without its semantic channel.
    pub degraded: bool,
    pub snapshot_version: u64,
    pub from_cache: bool,
    pub time_ms: f64,
}

/// A pool candidate after reranking.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RerankedCandidate {
    pub chunk_id: String,
    pub topic_id: String,
    pub fused_score: f64,
    pub rerank_score: Option<f64>,
}

/// The query a topic's passages were reranked against.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RerankQuery {
    pub topic_id: String,
    pub query: String,
}

/// Every intermediate stage of one query.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub query: String,
    pub expanded_terms: Vec<Expansion>,
    pub query_terms: Vec<QueryTerm>,
    pub topic_scores: Vec<TopicScore>,
    pub lexical_ranking: Vec<(String, f64)>,
    pub semantic_ranking: Vec<(String, f64)>,
    pub fused_ranking: Vec<FusedCandidate>,
    pub reranker: String,
    pub rerank_queries: Vec<RerankQuery>,
    pub reranked: Vec<RerankedCandidate>,
    pub topic_confidence: Vec<RatedTopic>,
    pub tier: ConfidenceTier,
    pub flagged_gap: bool,
    pub degraded: bool,
    pub results: Vec<SearchResult>,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStatus {
    pub id: String,
    pub name: String,
    pub domains: Vec<String>,
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub snapshot_version: u64,
    pub last_indexed_at: Option<String>,
    pub embedding_model: String,
    pub reranker: String,
    pub topic_count: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub concept_relations: usize,
    pub cache_enabled: bool,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub topics: Vec<TopicStatus>,
}

pub struct Engine {
    config: Config,
    config_json: String,
    corpus: Corpus,
    store: Store,
    concepts: ConceptGraph,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: tokio::sync::Mutex<()>,
    cache: QueryCache<SearchResponse>,
    progress: Box<dyn IndexProgressReporter>,
}

impl Engine {
    /// Open the engine with the providers named in `config`.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embedding)?;
        let reranker = create_reranker(&config.rerank)?;
        Self::open_with(config, embedder, reranker).await
    }

    /// Open the engine with explicit providers.
    pub async fn open_with(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        config.validate()?;
        let corpus = Corpus::new(&config.corpus)?;
        let concepts = concepts::active_graph(&config)?;
        let store = Store::open(&config.snapshot.dir).await?;
        concepts::save_graph(&concepts, store.dir())?;
        let snapshot = store.load().await?;
        let config_json = serde_json::to_string(&config).map_err(anyhow::Error::from)?;

        info!(
            version = snapshot.version,
            chunks = snapshot.chunks.len(),
            embedder = embedder.model_name(),
            reranker = reranker.name(),
            "engine opened"
        );

        Ok(Self {
            cache: QueryCache::new(&config.cache),
            config,
            config_json,
            corpus,
            store,
            concepts,
            embedder,
            reranker,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
            progress: Box::new(NoProgress),
        })
    }

    /// Report reindex progress through `reporter`.
    pub fn with_progress(mut self, reporter: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, next: Snapshot) {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuild the snapshot for `paths` (the whole corpus when empty).
    ///
    /// Documents are rechunked and re-embedded only when their content
    /// changed. The new snapshot is persisted before it is published.
    pub async fn reindex(&self, paths: &[PathBuf]) -> Result<ReindexReport> {
        let _writer = self.writer.lock().await;
        let scope = self.corpus.resolve_scope(paths)?;
        let previous = self.snapshot();

        let ctx = IndexContext {
            config: &self.config,
            corpus: &self.corpus,
            embedder: self.embedder.as_ref(),
            progress: self.progress.as_ref(),
        };
        let (next, report) = indexer::build_next(&ctx, &previous, &scope).await?;

        if let Some(next) = next {
            self.store.save(&next, &self.config_json).await?;
            concepts::save_graph(&self.concepts, self.store.dir())?;
            let version = next.version;
            self.publish(next);
            self.progress
                .report(IndexProgressEvent::Published { version });
            info!(version, "snapshot published");
        }

        Ok(report)
    }

    /// Delete all persisted state and publish an empty snapshot.
    pub async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.store.clear().await?;
        self.publish(Snapshot::empty());
        self.cache.invalidate_all();
        info!("index cleared");
        Ok(())
    }

    /// The published snapshot, indexing once on demand when it is empty.
    async fn ready_snapshot(&self) -> Result<Arc<Snapshot>> {
        let snapshot = self.snapshot();
        if !snapshot.is_empty() {
            return Ok(snapshot);
        }
        info!("index is empty, indexing corpus");
        self.reindex(&[]).await?;
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(EngineError::EmptyIndex);
        }
        Ok(snapshot)
    }

    fn check_request(query: &str, top_k: Option<usize>) -> Result<()> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidRequest("query is empty".to_string()));
        }
        if top_k == Some(0) {
            return Err(EngineError::InvalidRequest("top_k must be > 0".to_string()));
        }
        Ok(())
    }

    /// Retrieve the passages relevant to `query`, shaped by confidence and
    /// budget. `top_k` further limits the total chunk count.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<SearchResponse> {
        Self::check_request(query, top_k)?;
        let started = Instant::now();
        let top_k = top_k.unwrap_or(self.config.budget.max_total_chunks);
        let snapshot = self.ready_snapshot().await?;

        let key = CacheKey::new(query, top_k, snapshot.version);
        let (mut response, hit) = self
            .cache
            .get_or_compute(key, || async {
                let trace = self.run_timed(&snapshot, query, top_k).await?;
                Ok::<_, EngineError>(response_from_trace(trace))
            })
            .await?;

        response.from_cache = hit;
        response.time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            query,
            tier = %response.tier,
            results = response.results.len(),
            from_cache = hit,
            time_ms = response.time_ms,
            "search"
        );
        Ok(response)
    }

    /// Run the pipeline and return every intermediate stage. Never cached.
    pub async fn explain(&self, query: &str) -> Result<Trace> {
        Self::check_request(query, None)?;
        let snapshot = self.ready_snapshot().await?;
        self.run_timed(&snapshot, query, self.config.budget.max_total_chunks)
            .await
    }

    /// Search and render the results as a markdown block of at most
    /// `max_tokens` estimated tokens. A gap renders as an empty string.
    pub async fn context(&self, query: &str, max_tokens: usize) -> Result<String> {
        let response = self.search(query, None).await?;
        Ok(render_context(&response, max_tokens))
    }

    pub fn status(&self) -> Status {
        let snapshot = self.snapshot();
        let mut chunk_counts: HashMap<&str, usize> = HashMap::new();
        for chunk in &snapshot.chunks {
            *chunk_counts.entry(chunk.topic_id.as_str()).or_insert(0) += 1;
        }
        let mut doc_counts: HashMap<&str, usize> = HashMap::new();
        for doc in snapshot.documents.values() {
            *doc_counts.entry(doc.topic_id.as_str()).or_insert(0) += 1;
        }

        let topics = snapshot
            .topics
            .iter()
            .map(|t| TopicStatus {
                id: t.id.clone(),
                name: t.name.clone(),
                domains: t.domains.clone(),
                documents: doc_counts.get(t.id.as_str()).copied().unwrap_or(0),
                chunks: chunk_counts.get(t.id.as_str()).copied().unwrap_or(0),
            })
            .collect();

        Status {
            snapshot_version: snapshot.version,
            last_indexed_at: snapshot.published_at.map(|t| t.to_rfc3339()),
            embedding_model: snapshot.embedding_model.clone(),
            reranker: self.reranker.name().to_string(),
            topic_count: snapshot.topics.len(),
            document_count: snapshot.documents.len(),
            chunk_count: snapshot.chunks.len(),
            embedded_count: snapshot.embedded_count(),
            concept_relations: self.concepts.relation_count(),
            cache_enabled: self.cache.is_enabled(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            topics,
        }
    }

    /// Run the pipeline under `retrieval.query_timeout_ms`.
    ///
    /// The timeout only fires at await points, so the synchronous stages
    /// check the deadline themselves.
    async fn run_timed(&self, snapshot: &Snapshot, query: &str, top_k: usize) -> Result<Trace> {
        let deadline = Deadline::start(self.config.retrieval.query_timeout_ms);
        let result = tokio::time::timeout(
            deadline.budget(),
            self.run(snapshot, query, top_k, &deadline),
        )
        .await;
        match result {
            Ok(Ok(trace)) => {
                deadline.check("shape")?;
                Ok(trace)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(deadline.expired("await")),
        }
    }

    async fn query_vector(&self, snapshot: &Snapshot, query: &str) -> (Option<Vec<f32>>, bool) {
        if !self.embedder.is_enabled() {
            return (None, false);
        }
        if snapshot.embedding_model != self.embedder.model_name() {
            warn!(
                snapshot_model = %snapshot.embedding_model,
                provider_model = self.embedder.model_name(),
                "snapshot was embedded with another model, running lexical-only"
            );
            return (None, true);
        }
        match embed_query(self.embedder.as_ref(), query).await {
            Ok(v) => (Some(v), false),
            Err(e) => {
                let err = EngineError::EmbeddingProvider(e.to_string());
                warn!(error = %err, "query embedding failed, running lexical-only");
                (None, true)
            }
        }
    }

    async fn run(
        &self,
        snapshot: &Snapshot,
        query: &str,
        top_k: usize,
        deadline: &Deadline,
    ) -> Result<Trace> {
        let cfg = &self.config;

        let expansions = self.concepts.expand(
            query,
            cfg.concepts.max_expansions,
            cfg.concepts.min_weight,
        );
        let query_terms = weighted_query(query, &expansions, cfg.retrieval.expansion_weight);
        deadline.check("expand")?;

        let (query_vec, degraded) = self.query_vector(snapshot, query).await;
        let query_vec = query_vec.as_deref();

        let prune = PruneParams {
            top_k: cfg.retrieval.prune_top_k,
            lexical_weight: cfg.retrieval.lexical_weight,
            trigger_boost: cfg.retrieval.trigger_boost,
            anti_example_penalty: cfg.retrieval.anti_example_penalty,
        };
        let topic_scores = snapshot
            .fingerprints
            .prune(query, &query_terms, query_vec, &prune);
        deadline.check("prune")?;

        let kept: HashSet<&str> = topic_scores.iter().map(|s| s.topic_id.as_str()).collect();
        let candidates = snapshot.chunks_in_topics(&kept);
        let retrieval = retrieve(
            &query_terms,
            query_vec,
            &candidates,
            &snapshot.lexical,
            &RetrieveParams {
                candidate_k: cfg.retrieval.candidate_k,
                rrf_k: cfg.retrieval.rrf_k,
            },
        );
        deadline.check("retrieve")?;

        let pruned: Vec<&str> = topic_scores.iter().map(|s| s.topic_id.as_str()).collect();
        let (reranked, rerank_queries) = self
            .rerank(snapshot, query, &retrieval.fused, &pruned, degraded)
            .await;
        deadline.check("rerank")?;
        let rerank_active = reranked.iter().any(|c| c.rerank_score.is_some());

        let prune_scores: HashMap<&str, f64> = topic_scores
            .iter()
            .map(|s| (s.topic_id.as_str(), s.score))
            .collect();
        let mut best_rerank: HashMap<&str, f64> = HashMap::new();
        for c in &reranked {
            let best = best_rerank.entry(c.topic_id.as_str()).or_insert(0.0);
            if let Some(r) = c.rerank_score {
                *best = best.max(r);
            }
        }
        let confidences: HashMap<String, f64> = best_rerank
            .iter()
            .map(|(topic, best)| {
                let prune = prune_scores.get(topic).copied().unwrap_or(0.0);
                let rerank = rerank_active.then_some(*best);
                (
                    topic.to_string(),
                    topic_confidence(prune, rerank, cfg.rerank.weight),
                )
            })
            .collect();
        let rated = rate_topics(confidences);

        let ranked: Vec<ScoredChunk> = reranked
            .iter()
            .filter_map(|c| {
                let chunk = snapshot.chunk(&c.chunk_id)?;
                Some(ScoredChunk {
                    chunk_id: c.chunk_id.clone(),
                    topic_id: c.topic_id.clone(),
                    score: match c.rerank_score {
                        Some(r) if !degraded => r,
                        _ => c.fused_score,
                    },
                    token_count: chunk.token_count,
                })
            })
            .collect();

        let thresholds = Thresholds {
            confident: cfg.confidence.confident,
            uncertain: cfg.confidence.uncertain,
        };
        let budget = Budget {
            max_chunks_per_topic: cfg.budget.max_chunks_per_topic,
            max_total_chunks: cfg.budget.max_total_chunks.min(top_k),
            max_total_tokens: cfg.budget.max_total_tokens,
        };
        let shaped = shape(&ranked, &rated, &thresholds, &budget);

        let results = shaped
            .chunks
            .iter()
            .filter_map(|s| {
                let chunk = snapshot.chunk(&s.chunk_id)?;
                Some(SearchResult {
                    topic_id: chunk.topic_id.clone(),
                    document_id: chunk.document_id.clone(),
                    section: chunk.section.clone(),
                    text: chunk.text.clone(),
                    score: s.score,
                })
            })
            .collect();

        Ok(Trace {
            query: query.to_string(),
            expanded_terms: expansions,
            query_terms,
            topic_scores,
            lexical_ranking: retrieval.lexical,
            semantic_ranking: retrieval.semantic,
            fused_ranking: retrieval.fused,
            reranker: self.reranker.name().to_string(),
            rerank_queries,
            reranked,
            topic_confidence: rated,
            tier: shaped.tier,
            flagged_gap: shaped.flagged_gap,
            degraded,
            results,
            snapshot_version: snapshot.version,
        })
    }

    /// Rescore the top `pool_size` fused candidates. On failure (or when
    /// disabled) the fused order stands and no rerank scores are set.
    ///
    /// Each topic's passages are scored against that topic's focused query
    /// (see [`FingerprintIndex::focus_query`]). A degraded query keeps the
    /// lexical order; its rerank scores only feed topic confidence.
    ///
    /// [`FingerprintIndex::focus_query`]: skill_index_core::fingerprint::FingerprintIndex::focus_query
    async fn rerank(
        &self,
        snapshot: &Snapshot,
        query: &str,
        fused: &[FusedCandidate],
        candidates: &[&str],
        degraded: bool,
    ) -> (Vec<RerankedCandidate>, Vec<RerankQuery>) {
        let mut pool: Vec<RerankedCandidate> = fused
            .iter()
            .take(self.config.rerank.pool_size)
            .filter_map(|f| {
                let chunk = snapshot.chunk(&f.chunk_id)?;
                Some(RerankedCandidate {
                    chunk_id: f.chunk_id.clone(),
                    topic_id: chunk.topic_id.clone(),
                    fused_score: f.fused_score,
                    rerank_score: None,
                })
            })
            .collect();
        if pool.is_empty() || !self.reranker.is_enabled() {
            return (pool, Vec::new());
        }

        // Pool positions per topic, in first-seen order.
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, c) in pool.iter().enumerate() {
            match groups.iter_mut().find(|(topic, _)| *topic == c.topic_id) {
                Some((_, positions)) => positions.push(i),
                None => groups.push((c.topic_id.clone(), vec![i])),
            }
        }

        let mut scores = vec![0.0f64; pool.len()];
        let mut queries = Vec::with_capacity(groups.len());
        for (topic_id, positions) in &groups {
            let focus = snapshot
                .fingerprints
                .focus_query(query, topic_id, candidates);
            let passages: Vec<String> = positions
                .iter()
                .filter_map(|&i| snapshot.chunk(&pool[i].chunk_id))
                .map(|chunk| {
                    contextual_text(snapshot.topic_name(&chunk.topic_id), &chunk.section, &chunk.text)
                })
                .collect();

            match self.reranker.score(&focus, &passages).await {
                Ok(batch) if batch.len() == positions.len() => {
                    for (&i, s) in positions.iter().zip(batch) {
                        scores[i] = (s as f64).clamp(0.0, 1.0);
                    }
                }
                Ok(batch) => {
                    warn!(
                        reranker = self.reranker.name(),
                        got = batch.len(),
                        expected = positions.len(),
                        "reranker returned the wrong number of scores, keeping fused order"
                    );
                    return (pool, Vec::new());
                }
                Err(e) => {
                    warn!(reranker = self.reranker.name(), error = %e, "rerank failed, keeping fused order");
                    return (pool, Vec::new());
                }
            }
            queries.push(RerankQuery {
                topic_id: topic_id.clone(),
                query: focus,
            });
        }

        for (c, s) in pool.iter_mut().zip(scores) {
            c.rerank_score = Some(s);
        }
        if !degraded {
            pool.sort_by(|a, b| {
                let (ra, rb) = (a.rerank_score.unwrap_or(0.0), b.rerank_score.unwrap_or(0.0));
                rb.partial_cmp(&ra)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        b.fused_score
                            .partial_cmp(&a.fused_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.chunk_id.cmp(&b.chunk_id))
            });
        }
        (pool, queries)
    }
}

/// Query time budget, checked between pipeline stages.
struct Deadline {
    started: Instant,
    budget_ms: u64,
}

impl Deadline {
    fn start(budget_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget_ms,
        }
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    fn check(&self, stage: &str) -> Result<()> {
        if self.started.elapsed() > self.budget() {
            return Err(self.expired(stage));
        }
        Ok(())
    }

    fn expired(&self, stage: &str) -> EngineError {
        let budget_ms = self.budget_ms;
        warn!(budget_ms, stage, "query timed out");
        EngineError::Timeout { budget_ms }
    }
}

fn response_from_trace(trace: Trace) -> SearchResponse {
    let topics_used = {
        let mut seen = Vec::new();
        for r in &trace.results {
            if !seen.contains(&r.topic_id) {
                seen.push(r.topic_id.clone());
            }
        }
        seen
    };
    SearchResponse {
        query: trace.query,
        confidence: trace
            .topic_confidence
            .first()
            .map(|t| t.confidence)
            .unwrap_or(0.0),
        results: trace.results,
        tier: trace.tier,
        flagged_gap: trace.flagged_gap,
        topics_used,
        expanded_terms: trace.expanded_terms.into_iter().map(|e| e.term).collect(),
        degraded: trace.degraded,
        snapshot_version: trace.snapshot_version,
        from_cache: false,
        time_ms: 0.0,
    }
}

/// Render results as an LLM-ready markdown block. Blocks that would push
/// the total past `max_tokens` are left out.
pub fn render_context(response: &SearchResponse, max_tokens: usize) -> String {
    if response.results.is_empty() {
        return String::new();
    }
    let mut out = format!("# Relevant Knowledge ({})\n", response.topics_used.join(", "));
    let mut blocks = 0usize;

    for r in &response.results {
        let block = format!(
            "\n## [{}] {} > {}\n\n{}\n\n---\n",
            r.topic_id, r.document_id, r.section, r.text
        );
        let chars = out.chars().count() + block.chars().count();
        if chars.div_ceil(CHARS_PER_TOKEN) > max_tokens {
            continue;
        }
        out.push_str(&block);
        blocks += 1;
    }
    if blocks == 0 {
        return String::new();
    }
    out
}

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use skill_index::config::Config;
use skill_index::embedding::EmbeddingProvider;
use skill_index::engine::Engine;
use skill_index::rerank::{DisabledReranker, Reranker, TermOverlapReranker};
use skill_index::EngineError;
use skill_index_core::shape::ConfidenceTier;

const SENDABLE_QUERY: &str = "fix Sendable warning";

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Three topics: concurrency, SwiftUI and testing.
fn write_corpus(root: &Path) {
    write(
        &root.join("swift-concurrency/SKILL.md"),
        "---\n\
         name: Swift Concurrency\n\
         description: Actors, Sendable conformance and structured concurrency.\n\
         domains: [swift, concurrency]\n\
         triggers: [\"sendable\", \"data race\"]\n\
         examples: [\"how do I fix a Sendable warning\"]\n\
         anti_examples: [\"swiftui animation\"]\n\
         ---\n\
         # Swift Concurrency\n\nOverview of actors and tasks.\n",
    );
    write(
        &root.join("swift-concurrency/sendable.md"),
        "# Sendable\n\n\
         Fix a Sendable warning by making the type immutable or isolating its state to an actor.\n\n\
         ## Data races\n\n\
         A data race happens when two tasks mutate shared state without isolation.\n",
    );
    write(
        &root.join("swiftui/SKILL.md"),
        "---\n\
         name: SwiftUI\n\
         description: Declarative views and layout.\n\
         domains: [swiftui, ui]\n\
         triggers: [\"swiftui\"]\n\
         anti_examples: [\"uikit\"]\n\
         ---\n\
         # SwiftUI\n\nDeclarative user interfaces.\n",
    );
    write(
        &root.join("swiftui/views.md"),
        "# Views\n\nSwiftUI views are value types that describe layout.\n",
    );
    write(
        &root.join("testing/SKILL.md"),
        "---\n\
         name: Testing\n\
         description: XCTest cases and expectations.\n\
         domains: [testing]\n\
         ---\n\
         # Testing\n\nWriting unit tests.\n",
    );
    write(
        &root.join("testing/xctest.md"),
        "# XCTest\n\nAssertions compare expected and actual values.\n",
    );
}

/// "a" owns Sendable conformance, "b" owns view state; the query
/// "fix Sendable warning in my view model" touches both.
fn write_routing_corpus(root: &Path) {
    write(
        &root.join("a/SKILL.md"),
        "---\n\
         name: Sendable Checking\n\
         description: Sendable diagnostics.\n\
         triggers: [\"Sendable conformance\"]\n\
         ---\n\
         # Sendable\n\nOverview.\n",
    );
    write(
        &root.join("a/warnings.md"),
        "# Sendable warnings\n\n\
         A Sendable warning appears when a value crosses an actor boundary. \
         Fix the Sendable warning by adding Sendable conformance.\n",
    );
    write(
        &root.join("b/SKILL.md"),
        "---\n\
         name: View State\n\
         description: Observable state.\n\
         triggers: [\"view state update\"]\n\
         ---\n\
         # View State\n\nOverview.\n",
    );
    write(
        &root.join("b/model.md"),
        "# View models\n\n\
         A view model publishes state that the view observes. Each state update redraws the view.\n",
    );
}

/// One topic whose BM25 and term-overlap orders disagree.
fn write_reentrancy_corpus(root: &Path) {
    write(
        &root.join("a/SKILL.md"),
        "---\nname: Alpha\ndescription: Notes.\n---\n# Alpha\n\nNotes.\n",
    );
    write(&root.join("a/x.md"), "# Actor reentrancy hop\n");
    write(
        &root.join("a/y.md"),
        "hop reentrancy actor hop reentrancy actor\n",
    );
}

/// Two topics with the same grid document; only "alpha" declares the
/// anti-example "legacy grid".
fn write_tied_corpus(root: &Path) {
    for (id, name, anti) in [
        ("alpha", "Alpha", "anti_examples: [\"legacy grid\"]\n"),
        ("beta", "Beta", ""),
    ] {
        write(
            &root.join(id).join("SKILL.md"),
            &format!(
                "---\nname: {}\ndescription: Grids.\n{}---\n# {}\n\nOverview.\n",
                name, anti, name
            ),
        );
        write(
            &root.join(id).join("grid.md"),
            "# Grid\n\nLegacy grid layout arranges cells in rows.\n",
        );
    }
}

struct Fixture {
    _tmp: TempDir,
    corpus: PathBuf,
    config: Config,
}

/// Lexical-only configuration over the three-topic corpus.
fn fixture() -> Fixture {
    fixture_from(write_corpus)
}

fn fixture_from(populate: fn(&Path)) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("skills");
    populate(&corpus);
    let mut config = Config::minimal(tmp.path().join("index"), &corpus);
    config.embedding.provider = "disabled".to_string();
    Fixture {
        _tmp: tmp,
        corpus,
        config,
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

struct SlowEmbedder;

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Scores every passage fully after blocking its thread.
struct BlockingReranker;

#[async_trait]
impl Reranker for BlockingReranker {
    fn name(&self) -> &str {
        "blocking"
    }
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(vec![1.0; passages.len()])
    }
}

#[tokio::test]
async fn test_sendable_query_is_confident() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let response = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert_eq!(response.tier, ConfidenceTier::Confident);
    assert!(!response.flagged_gap);
    assert!(!response.degraded);
    assert!(response.confidence >= 70.0);
    assert_eq!(response.topics_used, vec!["swift-concurrency"]);
    assert_eq!(response.results[0].document_id, "swift-concurrency/sendable.md");
    assert!(response.results[0].text.contains("Sendable warning"));
    assert!(response.expanded_terms.iter().any(|t| t == "data race"));
    assert!(response.results.len() <= 6);
}

#[tokio::test]
async fn test_sendable_query_with_hash_embeddings() {
    let mut fx = fixture();
    fx.config.embedding.provider = "hash".to_string();
    let engine = Engine::open(fx.config).await.unwrap();
    engine.reindex(&[]).await.unwrap();

    let status = engine.status();
    assert_eq!(status.embedding_model, "hash-256");
    assert_eq!(status.embedded_count, status.chunk_count);

    let response = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert!(!response.degraded);
    assert_eq!(response.tier, ConfidenceTier::Confident);
    assert_eq!(response.topics_used[0], "swift-concurrency");
}

#[tokio::test]
async fn test_unknown_domain_is_a_gap() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let response = engine.search("kubernetes helm chart", None).await.unwrap();
    assert_eq!(response.tier, ConfidenceTier::Gap);
    assert!(response.flagged_gap);
    assert!(response.results.is_empty());

    let block = engine.context("kubernetes helm chart", 2000).await.unwrap();
    assert_eq!(block, "");
}

#[tokio::test]
async fn test_partial_match_is_uncertain() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let response = engine.search("sendable kubernetes", None).await.unwrap();
    assert_eq!(response.tier, ConfidenceTier::Uncertain);
    assert!(!response.flagged_gap);
    assert!((50.0..70.0).contains(&response.confidence));
    assert_eq!(response.topics_used[0], "swift-concurrency");
}

#[tokio::test]
async fn test_anti_example_lowers_topic_score() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let trace = engine.explain("uikit views layout").await.unwrap();
    let swiftui = trace
        .topic_scores
        .iter()
        .find(|s| s.topic_id == "swiftui")
        .unwrap();
    assert!(swiftui.anti_example_matched);
    assert!((swiftui.score - (swiftui.coverage - 0.3).max(0.0)).abs() < 1e-9);

    // The penalty keeps a two-of-three term match below the uncertain line.
    assert_eq!(trace.tier, ConfidenceTier::Gap);
}

#[tokio::test]
async fn test_anti_example_hands_primary_to_other_topic() {
    let query = "legacy grid layout";

    let fx = fixture_from(write_tied_corpus);
    let engine = Engine::open(fx.config).await.unwrap();
    let response = engine.search(query, None).await.unwrap();
    assert_eq!(response.tier, ConfidenceTier::Confident);
    assert_eq!(response.topics_used[0], "beta");

    let trace = engine.explain(query).await.unwrap();
    let alpha = trace
        .topic_scores
        .iter()
        .find(|s| s.topic_id == "alpha")
        .unwrap();
    let beta = trace
        .topic_scores
        .iter()
        .find(|s| s.topic_id == "beta")
        .unwrap();
    assert!(alpha.anti_example_matched);
    assert!((beta.score - alpha.score - 0.3).abs() < 1e-9);

    // Without the penalty the two topics tie and "alpha" leads on id.
    let mut fx = fixture_from(write_tied_corpus);
    fx.config.retrieval.anti_example_penalty = 0.0;
    let engine = Engine::open(fx.config).await.unwrap();
    let response = engine.search(query, None).await.unwrap();
    assert_eq!(response.topics_used[0], "alpha");
    let trace = engine.explain(query).await.unwrap();
    assert_eq!(
        trace.topic_confidence[0].confidence,
        trace.topic_confidence[1].confidence
    );
}

#[tokio::test]
async fn test_exact_phrase_topic_beats_partial_overlap() {
    let query = "fix Sendable warning in my view model";
    let fx = fixture_from(write_routing_corpus);
    let engine = Engine::open(fx.config).await.unwrap();

    let response = engine.search(query, None).await.unwrap();
    assert_eq!(response.tier, ConfidenceTier::Confident);
    assert!(response.confidence >= 70.0);
    assert_eq!(response.topics_used, vec!["a"]);
    assert_eq!(response.results[0].document_id, "a/warnings.md");

    let trace = engine.explain(query).await.unwrap();
    let a = trace.topic_scores.iter().find(|s| s.topic_id == "a").unwrap();
    let b = trace.topic_scores.iter().find(|s| s.topic_id == "b").unwrap();
    assert!(!a.trigger_matched);
    assert!((a.trigger_overlap - 0.5).abs() < 1e-9);
    assert_eq!(b.trigger_overlap, 0.0);
    assert!(a.score > b.score);

    let focus = |topic: &str| {
        trace
            .rerank_queries
            .iter()
            .find(|q| q.topic_id == topic)
            .map(|q| q.query.clone())
    };
    assert_eq!(focus("a").as_deref(), Some("fix sendable warning in my"));
    assert_eq!(focus("b").as_deref(), Some("in my view model"));
    assert_eq!(trace.topic_confidence[0].topic_id, "a");
    assert!(trace.topic_confidence[1].confidence < 70.0);
}

#[tokio::test]
async fn test_explain_reports_every_stage() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let trace = engine.explain(SENDABLE_QUERY).await.unwrap();
    assert_eq!(trace.query, SENDABLE_QUERY);
    assert!(!trace.expanded_terms.is_empty());
    assert!(trace
        .query_terms
        .iter()
        .any(|q| q.term == "sendable" && q.weight == 1.0));
    assert!(trace
        .query_terms
        .iter()
        .filter(|q| q.term == "race")
        .all(|q| q.weight < 1.0));
    assert_eq!(trace.topic_scores[0].topic_id, "swift-concurrency");
    assert!(trace.topic_scores[0].trigger_matched);
    assert!(!trace.lexical_ranking.is_empty());
    assert!(trace.semantic_ranking.is_empty());
    assert_eq!(trace.reranker, "lexical");
    assert!(trace.reranked[0].rerank_score.is_some());
    assert_eq!(trace.topic_confidence[0].topic_id, "swift-concurrency");
    assert_eq!(trace.tier, ConfidenceTier::Confident);
    assert!(!trace.results.is_empty());

    let json = serde_json::to_value(&trace).unwrap();
    assert_eq!(json["tier"], "confident");
}

#[tokio::test]
async fn test_failing_embedder_runs_lexical_only() {
    let fx = fixture();
    let engine = Engine::open_with(
        fx.config,
        Arc::new(FailingEmbedder),
        Arc::new(TermOverlapReranker),
    )
    .await
    .unwrap();

    let report = engine.reindex(&[]).await.unwrap();
    assert!(report.published);
    assert!(report.errors.iter().any(|e| e.contains("connection refused")));
    assert_eq!(engine.status().embedded_count, 0);

    let response = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert!(response.degraded);
    assert_eq!(response.results[0].document_id, "swift-concurrency/sendable.md");
}

#[tokio::test]
async fn test_degraded_results_follow_lexical_order() {
    let fx = fixture_from(write_reentrancy_corpus);
    let engine = Engine::open_with(
        fx.config,
        Arc::new(FailingEmbedder),
        Arc::new(TermOverlapReranker),
    )
    .await
    .unwrap();

    let trace = engine.explain("actor reentrancy hop").await.unwrap();
    assert!(trace.degraded);

    let snapshot = engine.snapshot();
    let lexical_docs: Vec<&str> = trace
        .lexical_ranking
        .iter()
        .filter_map(|(id, _)| snapshot.chunk(id))
        .map(|c| c.document_id.as_str())
        .collect();
    let result_docs: Vec<&str> = trace
        .results
        .iter()
        .map(|r| r.document_id.as_str())
        .collect();
    assert_eq!(lexical_docs, vec!["a/y.md", "a/x.md"]);
    assert_eq!(result_docs, lexical_docs);

    let lexical_ids: Vec<&str> = trace.lexical_ranking.iter().map(|(id, _)| id.as_str()).collect();
    let reranked_ids: Vec<&str> = trace.reranked.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(reranked_ids, lexical_ids);

    // The reranker prefers x.md but only feeds topic confidence.
    let rerank_of = |doc: &str| {
        trace
            .reranked
            .iter()
            .find(|c| snapshot.chunk(&c.chunk_id).map(|ch| ch.document_id.as_str()) == Some(doc))
            .and_then(|c| c.rerank_score)
            .unwrap()
    };
    assert!(rerank_of("a/x.md") > rerank_of("a/y.md"));
}

#[tokio::test]
async fn test_disabled_reranker_keeps_fused_order() {
    let mut fx = fixture();
    fx.config.rerank.provider = "disabled".to_string();
    let engine = Engine::open(fx.config).await.unwrap();

    let trace = engine.explain(SENDABLE_QUERY).await.unwrap();
    assert_eq!(trace.reranker, "disabled");
    assert!(trace.reranked.iter().all(|c| c.rerank_score.is_none()));
    let fused: Vec<&str> = trace
        .fused_ranking
        .iter()
        .take(trace.reranked.len())
        .map(|f| f.chunk_id.as_str())
        .collect();
    let reranked: Vec<&str> = trace.reranked.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(fused, reranked);

    // Without a rerank signal the confidence is the prune score.
    assert_eq!(trace.tier, ConfidenceTier::Confident);
    assert!((trace.topic_confidence[0].confidence - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_slow_embedder_times_out() {
    let mut fx = fixture();
    fx.config.retrieval.query_timeout_ms = 50;
    let engine = Engine::open_with(
        fx.config,
        Arc::new(SlowEmbedder),
        Arc::new(TermOverlapReranker),
    )
    .await
    .unwrap();
    engine.reindex(&[]).await.unwrap();

    let err = engine.search(SENDABLE_QUERY, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { budget_ms: 50 }));
}

#[tokio::test]
async fn test_blocking_stage_times_out() {
    let mut fx = fixture();
    fx.config.retrieval.query_timeout_ms = 50;
    let engine = Engine::open_with(
        fx.config,
        Arc::new(skill_index::embedding::DisabledProvider),
        Arc::new(BlockingReranker),
    )
    .await
    .unwrap();
    engine.reindex(&[]).await.unwrap();

    let err = engine.search(SENDABLE_QUERY, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { budget_ms: 50 }));
    let err = engine.explain(SENDABLE_QUERY).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { budget_ms: 50 }));
}

#[tokio::test]
async fn test_empty_corpus_reports_empty_index() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("skills");
    fs::create_dir_all(&corpus).unwrap();
    let mut config = Config::minimal(tmp.path().join("index"), &corpus);
    config.embedding.provider = "disabled".to_string();
    let engine = Engine::open(config).await.unwrap();

    let err = engine.search(SENDABLE_QUERY, None).await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyIndex));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    assert!(matches!(
        engine.search("   ", None).await.unwrap_err(),
        EngineError::InvalidRequest(_)
    ));
    assert!(matches!(
        engine.search(SENDABLE_QUERY, Some(0)).await.unwrap_err(),
        EngineError::InvalidRequest(_)
    ));
    assert!(matches!(
        engine.reindex(&[PathBuf::from("/definitely/not/in/corpus.md")]).await.unwrap_err(),
        EngineError::InvalidRequest(_)
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut fx = fixture();
    fx.config.rerank.weight = 2.0;
    let err = Engine::open(fx.config).await.err().unwrap();
    assert!(matches!(err, EngineError::Config(_)));
}

#[tokio::test]
async fn test_top_k_limits_results() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let response = engine.search(SENDABLE_QUERY, Some(1)).await.unwrap();
    assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn test_reindex_without_changes_is_a_no_op() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let first = engine.reindex(&[]).await.unwrap();
    assert!(first.published);
    assert_eq!(first.documents_indexed, 6);
    assert_eq!(first.snapshot_version, 1);

    let second = engine.reindex(&[]).await.unwrap();
    assert!(!second.published);
    assert_eq!(second.documents_indexed, 0);
    assert_eq!(second.documents_unchanged, 6);
    assert_eq!(second.snapshot_version, 1);
    assert_eq!(engine.status().snapshot_version, 1);
}

#[tokio::test]
async fn test_reindex_only_touches_changed_documents() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();
    engine.reindex(&[]).await.unwrap();

    write(
        &fx.corpus.join("swiftui/views.md"),
        "# Views\n\nSwiftUI views are value types. Modifiers wrap them.\n",
    );
    fs::remove_file(fx.corpus.join("testing/xctest.md")).unwrap();

    let report = engine.reindex(&[]).await.unwrap();
    assert!(report.published);
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.documents_unchanged, 4);
    assert_eq!(report.documents_removed, 1);
    assert_eq!(report.snapshot_version, 2);

    let status = engine.status();
    assert_eq!(status.document_count, 5);
    let testing = status.topics.iter().find(|t| t.id == "testing").unwrap();
    assert_eq!(testing.documents, 1);
}

#[tokio::test]
async fn test_scoped_reindex_leaves_other_documents() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();
    engine.reindex(&[]).await.unwrap();

    let views = fx.corpus.join("swiftui/views.md");
    write(&views, "# Views\n\nModifiers wrap views.\n");
    write(
        &fx.corpus.join("testing/xctest.md"),
        "# XCTest\n\nChanged but out of scope.\n",
    );

    let report = engine.reindex(&[views]).await.unwrap();
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.documents_removed, 0);

    // The out-of-scope edit is picked up by the next full run.
    let report = engine.reindex(&[]).await.unwrap();
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.documents_unchanged, 5);
}

#[tokio::test]
async fn test_unreadable_document_is_skipped() {
    let fx = fixture();
    fs::write(fx.corpus.join("swiftui/broken.md"), [0xff, 0xfe, 0x00, 0x9f]).unwrap();
    let engine = Engine::open(fx.config).await.unwrap();

    let report = engine.reindex(&[]).await.unwrap();
    assert!(report.published);
    assert_eq!(report.documents_indexed, 6);
    assert_eq!(report.documents_skipped, 1);
    assert!(report.errors.iter().any(|e| e.contains("swiftui/broken.md")));
}

#[tokio::test]
async fn test_repeated_query_hits_cache() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let first = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert!(!first.from_cache);
    let second = engine.search("  fix sendable   WARNING ", None).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(first.results, second.results);

    write(
        &fx.corpus.join("swiftui/views.md"),
        "# Views\n\nModifiers wrap views.\n",
    );
    engine.reindex(&[]).await.unwrap();
    let third = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(third.snapshot_version, 2);

    let status = engine.status();
    assert_eq!(status.cache_hits, 1);
    assert_eq!(status.cache_misses, 2);
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let fx = fixture();
    let config = fx.config.clone();
    let chunk_count = {
        let engine = Engine::open(config.clone()).await.unwrap();
        engine.reindex(&[]).await.unwrap();
        engine.status().chunk_count
    };

    let engine = Engine::open(config).await.unwrap();
    let status = engine.status();
    assert_eq!(status.snapshot_version, 1);
    assert_eq!(status.chunk_count, chunk_count);
    assert!(status.last_indexed_at.is_some());

    let report = engine.reindex(&[]).await.unwrap();
    assert!(!report.published);
}

#[tokio::test]
async fn test_clear_then_search_rebuilds() {
    let fx = fixture();
    let index_dir = fx.config.snapshot.dir.clone();
    let engine = Engine::open(fx.config).await.unwrap();
    engine.reindex(&[]).await.unwrap();
    assert!(index_dir.join("concepts.toml").exists());

    engine.clear().await.unwrap();
    let status = engine.status();
    assert_eq!(status.snapshot_version, 0);
    assert_eq!(status.chunk_count, 0);
    assert!(!index_dir.join("concepts.toml").exists());

    let response = engine.search(SENDABLE_QUERY, None).await.unwrap();
    assert_eq!(response.snapshot_version, 1);
    assert!(!response.results.is_empty());
    assert!(index_dir.join("concepts.toml").exists());
}

#[tokio::test]
async fn test_queries_run_during_reindex() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();
    engine.reindex(&[]).await.unwrap();

    write(
        &fx.corpus.join("swiftui/views.md"),
        "# Views\n\nModifiers wrap views.\n",
    );
    let (search, reindex) = tokio::join!(
        engine.search(SENDABLE_QUERY, None),
        engine.reindex(&[])
    );
    let response = search.unwrap();
    assert!(response.snapshot_version == 1 || response.snapshot_version == 2);
    assert_eq!(response.tier, ConfidenceTier::Confident);
    assert_eq!(reindex.unwrap().snapshot_version, 2);
}

#[tokio::test]
async fn test_context_block_is_markdown() {
    let fx = fixture();
    let engine = Engine::open(fx.config).await.unwrap();

    let block = engine.context(SENDABLE_QUERY, 2000).await.unwrap();
    assert!(block.starts_with("# Relevant Knowledge (swift-concurrency)"));
    assert!(block.contains("## [swift-concurrency] swift-concurrency/sendable.md > Sendable"));
}

#[tokio::test]
async fn test_disabled_reranker_with_explicit_provider() {
    let fx = fixture();
    let engine = Engine::open_with(
        fx.config,
        Arc::new(skill_index::embedding::DisabledProvider),
        Arc::new(DisabledReranker),
    )
    .await
    .unwrap();
    let status = engine.status();
    assert_eq!(status.reranker, "disabled");
    assert_eq!(status.snapshot_version, 0);
}

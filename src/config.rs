//! TOML configuration.
//!
//! Every section except `[snapshot]` and `[corpus]` is optional; each field
//! carries a default. Values are validated once at load time and rejected
//! with [`EngineError::Config`], never clamped.
//!
//! ```toml
//! [snapshot]
//! dir = "./data/skills-index"
//!
//! [corpus]
//! roots = ["./skills"]
//!
//! [embedding]
//! provider = "hash"
//!
//! [rerank]
//! provider = "lexical"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub concepts: ConceptsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnapshotConfig {
    /// Directory holding `index.sqlite` and `concepts.toml`.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorpusConfig {
    /// Each immediate sub-directory of a root is one topic.
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `hash`, `openai`, `ollama` or `local`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConceptsConfig {
    /// TOML concept graph; the built-in graph is used when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
}

impl Default for ConceptsConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_expansions: default_max_expansions(),
            min_weight: default_min_weight(),
        }
    }
}

fn default_max_expansions() -> usize {
    6
}
fn default_min_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// K: topics kept by the pruner.
    #[serde(default = "default_prune_top_k")]
    pub prune_top_k: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_trigger_boost")]
    pub trigger_boost: f64,
    #[serde(default = "default_anti_example_penalty")]
    pub anti_example_penalty: f64,
    /// Multiplier applied to concept-graph edge weights; must be < 1.
    #[serde(default = "default_expansion_weight")]
    pub expansion_weight: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            prune_top_k: default_prune_top_k(),
            lexical_weight: default_lexical_weight(),
            trigger_boost: default_trigger_boost(),
            anti_example_penalty: default_anti_example_penalty(),
            expansion_weight: default_expansion_weight(),
            candidate_k: default_candidate_k(),
            rrf_k: default_rrf_k(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_prune_top_k() -> usize {
    10
}
fn default_lexical_weight() -> f64 {
    0.6
}
fn default_trigger_boost() -> f64 {
    0.25
}
fn default_anti_example_penalty() -> f64 {
    0.3
}
fn default_expansion_weight() -> f64 {
    0.5
}
fn default_candidate_k() -> usize {
    50
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_query_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankConfig {
    /// `lexical`, `local` or `disabled`.
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// N: fused candidates rescored.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Share of the rerank signal in topic confidence.
    #[serde(default = "default_rerank_weight")]
    pub weight: f64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            model: None,
            pool_size: default_pool_size(),
            weight: default_rerank_weight(),
        }
    }
}

fn default_rerank_provider() -> String {
    "lexical".to_string()
}
fn default_pool_size() -> usize {
    20
}
fn default_rerank_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_confident")]
    pub confident: f64,
    #[serde(default = "default_uncertain")]
    pub uncertain: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            confident: default_confident(),
            uncertain: default_uncertain(),
        }
    }
}

fn default_confident() -> f64 {
    70.0
}
fn default_uncertain() -> f64 {
    50.0
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BudgetConfig {
    #[serde(default = "default_max_chunks_per_topic")]
    pub max_chunks_per_topic: usize,
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: usize,
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_topic: default_max_chunks_per_topic(),
            max_total_chunks: default_max_total_chunks(),
            max_total_tokens: default_max_total_tokens(),
        }
    }
}

fn default_max_chunks_per_topic() -> usize {
    3
}
fn default_max_total_chunks() -> usize {
    6
}
fn default_max_total_tokens() -> usize {
    5000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
    /// Entries idle longer than this expire.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_max_entries() -> u64 {
    512
}
fn default_cache_ttl_secs() -> u64 {
    600
}

impl Config {
    /// Defaults everywhere, one snapshot dir and one corpus root.
    pub fn minimal(snapshot_dir: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: SnapshotConfig {
                dir: snapshot_dir.into(),
            },
            corpus: CorpusConfig {
                roots: vec![root.into()],
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            concepts: ConceptsConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            confidence: ConfidenceConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Reject invalid values. Called by [`load_config`] and `Engine::open`.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn bail(msg: impl Into<String>) -> Result<(), EngineError> {
            Err(EngineError::Config(msg.into()))
        }
        fn unit(name: &str, v: f64) -> Result<(), EngineError> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                bail(format!("{} must be in [0.0, 1.0], got {}", name, v))
            }
        }

        if self.corpus.roots.is_empty() {
            return bail("corpus.roots must list at least one directory");
        }
        if self.chunking.max_tokens == 0 {
            return bail("chunking.max_tokens must be > 0");
        }
        if self.embedding.batch_size == 0 {
            return bail("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "hash" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    return bail(format!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    ));
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    return bail(format!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    ));
                }
            }
            other => {
                return bail(format!(
                    "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
                    other
                ))
            }
        }
        if self.embedding.dims == Some(0) {
            return bail("embedding.dims must be > 0");
        }

        if self.concepts.max_expansions == 0 {
            return bail("concepts.max_expansions must be > 0");
        }
        unit("concepts.min_weight", self.concepts.min_weight)?;

        let r = &self.retrieval;
        if r.prune_top_k == 0 {
            return bail("retrieval.prune_top_k must be > 0");
        }
        if r.candidate_k == 0 {
            return bail("retrieval.candidate_k must be > 0");
        }
        unit("retrieval.lexical_weight", r.lexical_weight)?;
        unit("retrieval.trigger_boost", r.trigger_boost)?;
        unit("retrieval.anti_example_penalty", r.anti_example_penalty)?;
        if !(r.expansion_weight > 0.0 && r.expansion_weight < 1.0) {
            return bail(format!(
                "retrieval.expansion_weight must be in (0.0, 1.0), got {}",
                r.expansion_weight
            ));
        }
        if !(r.rrf_k > 0.0) {
            return bail("retrieval.rrf_k must be > 0");
        }
        if r.query_timeout_ms == 0 {
            return bail("retrieval.query_timeout_ms must be > 0");
        }

        match self.rerank.provider.as_str() {
            "lexical" | "local" | "disabled" => {}
            other => {
                return bail(format!(
                    "Unknown rerank provider: '{}'. Must be lexical, local, or disabled.",
                    other
                ))
            }
        }
        if self.rerank.pool_size == 0 {
            return bail("rerank.pool_size must be > 0");
        }
        unit("rerank.weight", self.rerank.weight)?;

        let c = &self.confidence;
        if !(0.0..=100.0).contains(&c.confident) || !(0.0..=100.0).contains(&c.uncertain) {
            return bail("confidence thresholds must be in [0, 100]");
        }
        if c.uncertain > c.confident {
            return bail(format!(
                "confidence.uncertain ({}) must not exceed confidence.confident ({})",
                c.uncertain, c.confident
            ));
        }

        let b = &self.budget;
        if b.max_chunks_per_topic == 0 || b.max_total_chunks == 0 || b.max_total_tokens == 0 {
            return bail("budget caps must be > 0");
        }

        if self.cache.enabled && (self.cache.max_entries == 0 || self.cache.ttl_secs == 0) {
            return bail("cache.max_entries and cache.ttl_secs must be > 0 when the cache is enabled");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| EngineError::Config(format!("Failed to parse config file: {}", e)))?;

    config.validate()?;

    Ok(config)
}

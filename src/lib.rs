//! # Skill Index
//!
//! A local-first hybrid retrieval engine over topic-partitioned reference
//! corpora ("skills"). Each topic is a directory with a `SKILL.md`
//! manifest and markdown documents; queries are routed to the topics
//! they concern before any passage is scored.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Corpus  │──▶│   Indexer    │──▶│  Snapshot  │──▶ SQLite
//! │ SKILL.md │   │ Chunk+Embed  │   │ (Arc swap) │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!     query ─▶ expand ─▶ prune ─▶ BM25 ∥ cosine ─▶ RRF ─▶ rerank ─▶ shape
//! ```
//!
//! Scoring primitives live in the `skill-index-core` crate; this crate adds
//! the corpus scanner, providers, persistence and the [`engine::Engine`]
//! facade used by the `skix` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Topic discovery and document scanning |
//! | [`concepts`] | Built-in and file-based concept graphs |
//! | [`embedding`] | Embedding provider implementations |
//! | [`rerank`] | Reranker selection |
//! | [`indexer`] | Incremental snapshot builds |
//! | [`store`] | Snapshot persistence |
//! | [`cache`] | Query result cache |
//! | [`engine`] | The retrieval facade |

pub mod cache;
pub mod commands;
pub mod concepts;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod rerank;
pub mod store;

pub use engine::{Engine, SearchResponse, SearchResult, Status, Trace};
pub use error::EngineError;

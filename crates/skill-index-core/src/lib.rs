//! # skill-index core
//!
//! Pure retrieval logic for skill-index: data models, section-aware
//! chunking, BM25 statistics, concept-graph expansion, topic fingerprint
//! pruning, reciprocal rank fusion, reranker and embedding traits, and
//! confidence/budget shaping.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-bound dependencies; the `skill-index` app crate wires these
//! pieces to a corpus on disk and to concrete model providers.

pub mod chunk;
pub mod concepts;
pub mod embedding;
pub mod fingerprint;
pub mod fusion;
pub mod lexical;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod shape;
pub mod snapshot;
pub mod tokenize;

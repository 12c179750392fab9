//! Engine error taxonomy.
//!
//! Per-document indexing failures ([`EngineError::Index`]) are collected in
//! the reindex report and never abort a run. Query-path failures are
//! returned to the caller; an empty result is never substituted for one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to index {document}: {reason}")]
    Index { document: String, reason: String },

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("index is empty: the corpus has no indexable documents")]
    EmptyIndex,

    #[error("query exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    /// Recover a typed error that was carried through an `anyhow` chain.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(typed) => typed,
            Err(other) => EngineError::Internal(other),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

//! Reranker selection.
//!
//! `rerank.provider` picks the pairwise scorer applied to the top fused
//! candidates:
//! - `lexical`: [`TermOverlapReranker`], no model needed (default).
//! - `local`: a fastembed cross-encoder, scores passed through a sigmoid
//!   (feature `local-embeddings-fastembed`).
//! - `disabled`: [`DisabledReranker`]; the fused order stands.

use anyhow::{bail, Result};
use std::sync::Arc;

pub use skill_index_core::rerank::{DisabledReranker, Reranker, TermOverlapReranker};

use crate::config::RerankConfig;

pub fn create_reranker(config: &RerankConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "lexical" => Ok(Arc::new(TermOverlapReranker)),
        "disabled" => Ok(Arc::new(DisabledReranker)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(local::CrossEncoderReranker::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local reranker requires --features local-embeddings-fastembed"),
        other => bail!("Unknown rerank provider: {}", other),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use super::Reranker;
    use crate::config::RerankConfig;

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    fn to_model(name: &str) -> Result<fastembed::RerankerModel> {
        match name {
            "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
            "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
            other => bail!(
                "Unknown local rerank model: '{}'. Supported models: \
                 bge-reranker-base, jina-reranker-v1-turbo-en",
                other
            ),
        }
    }

    pub struct CrossEncoderReranker {
        name: String,
        model: Arc<Mutex<Option<fastembed::TextRerank>>>,
    }

    impl CrossEncoderReranker {
        pub fn new(config: &RerankConfig) -> Result<Self> {
            let name = config
                .model
                .clone()
                .unwrap_or_else(|| "bge-reranker-base".to_string());
            to_model(&name)?;
            Ok(Self {
                name,
                model: Arc::new(Mutex::new(None)),
            })
        }
    }

    #[async_trait]
    impl Reranker for CrossEncoderReranker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
            if passages.is_empty() {
                return Ok(Vec::new());
            }
            let model_id = to_model(&self.name)?;
            let slot = Arc::clone(&self.model);
            let query = query.to_string();
            let passages = passages.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut guard = slot
                    .lock()
                    .map_err(|_| anyhow::anyhow!("rerank model lock poisoned"))?;
                if guard.is_none() {
                    let model = fastembed::TextRerank::try_new(
                        fastembed::RerankInitOptions::new(model_id)
                            .with_show_download_progress(false),
                    )
                    .map_err(|e| anyhow::anyhow!("Failed to initialize rerank model: {}", e))?;
                    *guard = Some(model);
                }
                let model = guard
                    .as_mut()
                    .ok_or_else(|| anyhow::anyhow!("rerank model not loaded"))?;

                let documents: Vec<&str> = passages.iter().map(String::as_str).collect();
                let results = model
                    .rerank(query.as_str(), &documents, false, None)
                    .map_err(|e| anyhow::anyhow!("Rerank failed: {}", e))?;

                let mut scores = vec![0.0f32; passages.len()];
                for r in results {
                    if let Some(slot) = scores.get_mut(r.index) {
                        *slot = sigmoid(r.score);
                    }
                }
                Ok(scores)
            })
            .await?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_reranker_by_name() {
        let lexical = create_reranker(&RerankConfig::default()).unwrap();
        assert_eq!(lexical.name(), "lexical");
        assert!(lexical.is_enabled());

        let disabled = create_reranker(&RerankConfig {
            provider: "disabled".to_string(),
            ..RerankConfig::default()
        })
        .unwrap();
        assert!(!disabled.is_enabled());
    }
}

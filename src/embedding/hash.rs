//! Feature-hashing embedder.
//!
//! Deterministic, offline and dependency-free: each normalized term is
//! hashed (FNV-1a) into one of `dims` buckets with a hash-derived sign,
//! weighted by `1 + ln(tf)`, and the vector is L2-normalized. Texts that
//! share vocabulary land close together; paraphrases with no shared terms
//! do not. Good enough for a default that never fails; configure a neural
//! provider for real semantic recall.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use skill_index_core::embedding::{normalize, EmbeddingProvider};
use skill_index_core::tokenize;

pub const DEFAULT_HASH_DIMS: usize = 256;

pub struct HashProvider {
    model: String,
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            model: format!("hash-{}", dims),
            dims,
        }
    }

    fn fnv1a(term: &str) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut tf: HashMap<String, u32> = HashMap::new();
        for term in tokenize::terms(text) {
            *tf.entry(term).or_insert(0) += 1;
        }

        let mut vec = vec![0.0f32; self.dims];
        for (term, count) in &tf {
            let h = Self::fnv1a(term);
            let bucket = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign * (1.0 + (*count as f32).ln());
        }
        normalize(&vec)
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

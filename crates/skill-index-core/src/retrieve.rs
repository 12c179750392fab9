//! Hybrid chunk retrieval: BM25 ∥ cosine, fused with RRF.
//!
//! The retriever operates on the candidate chunks of the pruned topics.
//! Lexical statistics stay snapshot-wide so scores are comparable across
//! queries that prune to different topic sets.

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::fusion::{fuse, FusedCandidate};
use crate::lexical::{LexicalStats, QueryTerm};
use crate::models::Chunk;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrieveParams {
    /// Maximum entries per channel ranking.
    pub candidate_k: usize,
    /// RRF rank constant.
    pub rrf_k: f64,
}

/// Both channel rankings and their fusion.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Retrieval {
    pub lexical: Vec<(String, f64)>,
    pub semantic: Vec<(String, f64)>,
    pub fused: Vec<FusedCandidate>,
}

/// Rank `candidates` lexically and (when `query_vec` is present) by
/// cosine similarity, then fuse.
///
/// Only positive scores enter a ranking. Without a query vector the
/// fused order equals the lexical order.
pub fn retrieve(
    query_terms: &[QueryTerm],
    query_vec: Option<&[f32]>,
    candidates: &[&Chunk],
    stats: &LexicalStats,
    params: &RetrieveParams,
) -> Retrieval {
    let mut lexical: Vec<(String, f64)> = candidates
        .iter()
        .map(|c| (c.id.clone(), stats.score(query_terms, &c.terms)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    sort_ranking(&mut lexical);
    lexical.truncate(params.candidate_k);

    let mut semantic: Vec<(String, f64)> = match query_vec {
        Some(qv) => candidates
            .iter()
            .filter_map(|c| {
                let emb = c.embedding.as_deref()?;
                let sim = cosine_similarity(qv, emb) as f64;
                (sim > 0.0).then(|| (c.id.clone(), sim))
            })
            .collect(),
        None => Vec::new(),
    };
    sort_ranking(&mut semantic);
    semantic.truncate(params.candidate_k);

    let fused = fuse(&lexical, &semantic, params.rrf_k);

    Retrieval {
        lexical,
        semantic,
        fused,
    }
}

fn sort_ranking(ranking: &mut [(String, f64)]) {
    ranking.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;

    fn params() -> RetrieveParams {
        RetrieveParams {
            candidate_k: 50,
            rrf_k: 60.0,
        }
    }

    fn term(t: &str) -> QueryTerm {
        QueryTerm {
            term: t.to_string(),
            weight: 1.0,
        }
    }

    #[test]
    fn test_lexical_only_when_no_vector() {
        let mut chunks = chunk_document("t/a.md", "t", "actor actor isolation", 400);
        chunks.extend(chunk_document("t/b.md", "t", "actor reentrancy and await", 400));
        chunks.extend(chunk_document("t/c.md", "t", "navigation stack", 400));
        let stats = LexicalStats::build(&chunks);
        let refs: Vec<&Chunk> = chunks.iter().collect();

        let r = retrieve(&[term("actor")], None, &refs, &stats, &params());
        assert!(r.semantic.is_empty());
        assert_eq!(r.lexical.len(), 2);
        let fused_ids: Vec<_> = r.fused.iter().map(|f| f.chunk_id.clone()).collect();
        let lexical_ids: Vec<_> = r.lexical.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(fused_ids, lexical_ids);
        assert_eq!(r.lexical[0].0, chunks[0].id);
    }

    #[test]
    fn test_semantic_channel_finds_paraphrase() {
        let mut chunks = chunk_document("t/a.md", "t", "thread safety checklist", 400);
        chunks.extend(chunk_document("t/b.md", "t", "navigation stack", 400));
        chunks[0].embedding = Some(vec![1.0, 0.0]);
        chunks[1].embedding = Some(vec![0.0, 1.0]);
        let stats = LexicalStats::build(&chunks);
        let refs: Vec<&Chunk> = chunks.iter().collect();

        let r = retrieve(&[term("concurrency")], Some(&[0.9, 0.1]), &refs, &stats, &params());
        assert!(r.lexical.is_empty());
        assert_eq!(r.fused[0].chunk_id, chunks[0].id);
        assert_eq!(r.fused[0].semantic_rank, Some(1));
    }

    #[test]
    fn test_candidate_k_truncates() {
        let chunks: Vec<Chunk> = (0..10)
            .flat_map(|i| chunk_document(&format!("t/{}.md", i), "t", "actor", 400))
            .collect();
        let stats = LexicalStats::build(&chunks);
        let refs: Vec<&Chunk> = chunks.iter().collect();
        let p = RetrieveParams {
            candidate_k: 3,
            ..params()
        };
        let r = retrieve(&[term("actor")], None, &refs, &stats, &p);
        assert_eq!(r.lexical.len(), 3);
    }
}

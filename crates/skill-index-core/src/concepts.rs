//! Concept graph and depth-1 query expansion.
//!
//! The graph maps a normalized concept (a word or short phrase such as
//! `"data race"`) to related concepts with a weight in `(0, 1]`. Relations
//! are bidirectional. Aliases map shorthand (`"vm"`) to a canonical concept
//! (`"viewmodel"`) before lookup.
//!
//! Expansion is a single-hop lookup, so cycles in the graph are harmless.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::lexical::QueryTerm;
use crate::tokenize;

/// Longest concept phrase, in words, matched against the query.
const MAX_NGRAM: usize = 3;

/// One weighted relation as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub a: String,
    pub b: String,
    pub weight: f64,
}

/// Serialized form of a [`ConceptGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConceptFile {
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// A related concept selected by expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub term: String,
    /// Edge weight of the strongest relation that produced it.
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    relations: Vec<Relation>,
    edges: HashMap<String, Vec<(String, f64)>>,
    aliases: BTreeMap<String, String>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bidirectional relation. Concepts are lowercased.
    pub fn add_relation(&mut self, a: &str, b: &str, weight: f64) {
        let (a, b) = (a.trim().to_lowercase(), b.trim().to_lowercase());
        self.edges
            .entry(a.clone())
            .or_default()
            .push((b.clone(), weight));
        self.edges
            .entry(b.clone())
            .or_default()
            .push((a.clone(), weight));
        self.relations.push(Relation { a, b, weight });
    }

    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), canonical.trim().to_lowercase());
    }

    pub fn from_file(file: &ConceptFile) -> Self {
        let mut graph = Self::new();
        for r in &file.relations {
            graph.add_relation(&r.a, &r.b, r.weight);
        }
        for (alias, canonical) in &file.aliases {
            graph.add_alias(alias, canonical);
        }
        graph
    }

    pub fn to_file(&self) -> ConceptFile {
        ConceptFile {
            relations: self.relations.clone(),
            aliases: self.aliases.clone(),
        }
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn neighbors(&self, concept: &str) -> &[(String, f64)] {
        self.edges.get(concept).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct neighbours of every concept mentioned in `query`.
    ///
    /// Unigrams, bigrams and trigrams of the query are looked up (after
    /// alias resolution). Neighbours already present in the query are
    /// dropped; each remaining neighbour keeps its strongest edge weight.
    /// Results are ordered by weight, then term, and truncated to
    /// `max_expansions`.
    pub fn expand(&self, query: &str, max_expansions: usize, min_weight: f64) -> Vec<Expansion> {
        let words = tokenize::words(query);
        let mut mentioned: HashSet<String> = HashSet::new();
        let mut keys: Vec<String> = Vec::new();

        for n in 1..=MAX_NGRAM.min(words.len()) {
            for window in words.windows(n) {
                let phrase = window.join(" ");
                let resolved = self.aliases.get(&phrase).cloned().unwrap_or(phrase.clone());
                mentioned.insert(phrase);
                mentioned.insert(resolved.clone());
                keys.push(resolved);
            }
        }

        let mut candidates: HashMap<String, f64> = HashMap::new();
        for key in &keys {
            for (neighbor, weight) in self.neighbors(key) {
                if *weight < min_weight {
                    continue;
                }
                let entry = candidates.entry(neighbor.clone()).or_insert(0.0);
                if *weight > *entry {
                    *entry = *weight;
                }
            }
        }

        let mut ranked: Vec<Expansion> = candidates
            .into_iter()
            .filter(|(term, _)| !mentioned.contains(term))
            .map(|(term, weight)| Expansion { term, weight })
            .collect();
        ranked.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        ranked.truncate(max_expansions);
        ranked
    }
}

/// Build the weighted lexical query: original terms at `1.0`, expansion
/// terms at `edge weight × expansion_weight`.
///
/// With `expansion_weight < 1` and edge weights in `(0, 1]`, expansion
/// terms always weigh strictly less than original terms. A term that is
/// already part of the query keeps weight `1.0`.
pub fn weighted_query(
    query: &str,
    expansions: &[Expansion],
    expansion_weight: f64,
) -> Vec<QueryTerm> {
    let mut out: Vec<QueryTerm> = tokenize::unique_terms(query)
        .into_iter()
        .map(|term| QueryTerm { term, weight: 1.0 })
        .collect();
    let original = out.len();

    for expansion in expansions {
        let weight = expansion.weight * expansion_weight;
        for term in tokenize::terms(&expansion.term) {
            match out.iter_mut().position(|q| q.term == term) {
                Some(i) if i < original => {}
                Some(i) => {
                    if weight > out[i].weight {
                        out[i].weight = weight;
                    }
                }
                None => out.push(QueryTerm { term, weight }),
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ConceptGraph {
        let mut g = ConceptGraph::new();
        g.add_relation("sendable", "data race", 1.0);
        g.add_relation("sendable", "actor isolation", 0.9);
        g.add_relation("sendable", "nonisolated", 0.4);
        g.add_relation("data race", "thread safety", 1.0);
        g.add_relation("viewmodel", "mvvm", 1.0);
        g.add_alias("vm", "viewmodel");
        g
    }

    #[test]
    fn test_expand_direct_neighbors_only() {
        let exp = graph().expand("Sendable warning", 6, 0.5);
        let terms: Vec<_> = exp.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["data race", "actor isolation"]);
        // thread safety is two hops away
        assert!(!terms.contains(&"thread safety"));
    }

    #[test]
    fn test_expand_matches_phrases_and_drops_mentioned() {
        let exp = graph().expand("data race in sendable code", 6, 0.5);
        let terms: Vec<_> = exp.iter().map(|e| e.term.as_str()).collect();
        assert!(terms.contains(&"thread safety"));
        assert!(!terms.contains(&"data race"));
        assert!(!terms.contains(&"sendable"));
    }

    #[test]
    fn test_expand_resolves_aliases() {
        let exp = graph().expand("split my vm", 6, 0.5);
        assert_eq!(exp[0].term, "mvvm");
    }

    #[test]
    fn test_expand_unknown_terms_is_empty() {
        assert!(graph().expand("quantum chromodynamics", 6, 0.5).is_empty());
        assert!(graph().expand("", 6, 0.5).is_empty());
    }

    #[test]
    fn test_expand_respects_limit() {
        assert_eq!(graph().expand("sendable", 1, 0.0).len(), 1);
    }

    #[test]
    fn test_cyclic_edges_are_harmless() {
        let mut g = ConceptGraph::new();
        g.add_relation("a", "b", 1.0);
        g.add_relation("b", "a", 1.0);
        let exp = g.expand("a", 6, 0.5);
        assert_eq!(exp.len(), 1);
        assert_eq!(exp[0].term, "b");
    }

    #[test]
    fn test_weighted_query_expansion_below_original() {
        let exp = graph().expand("Sendable warning", 6, 0.5);
        let q = weighted_query("Sendable warning", &exp, 0.5);
        assert_eq!(q[0].term, "sendable");
        assert_eq!(q[0].weight, 1.0);
        let race = q.iter().find(|t| t.term == "race").map(|t| t.weight);
        assert_eq!(race, Some(0.5));
        assert!(q.iter().skip(2).all(|t| t.weight < 1.0));
    }

    #[test]
    fn test_file_roundtrip() {
        let g = graph();
        let restored = ConceptGraph::from_file(&g.to_file());
        assert_eq!(restored.to_file(), g.to_file());
        assert_eq!(restored.neighbors("mvvm").len(), 1);
    }
}

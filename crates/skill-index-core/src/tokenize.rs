//! Tokenization shared by indexing, expansion, pruning and scoring.
//!
//! Two levels are exposed:
//!
//! - [`words`]: raw lowercase tokens (`[@#]?\w+`), used for literal phrase
//!   matching and concept lookup, where attributes like `@mainactor` and
//!   macros like `#expect` must survive intact.
//! - [`terms`]: scoring terms: words minus stopwords, with light plural
//!   folding so `warnings` and `warning` share statistics.

use regex::Regex;
use std::sync::LazyLock;

static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[@#]?\w+").ok());

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for",
    "from", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or",
    "our", "so", "that", "the", "their", "then", "there", "these", "this", "to", "was", "we",
    "what", "when", "where", "which", "while", "why", "will", "with", "you", "your",
];

/// Split text into lowercase word tokens.
pub fn words(text: &str) -> Vec<String> {
    let Some(re) = WORD.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalize one lowercase word into a scoring term, or `None` for stopwords.
pub fn normalize_term(word: &str) -> Option<String> {
    if STOPWORDS.contains(&word) {
        return None;
    }
    if word.chars().count() < 2 {
        return None;
    }
    let n = word.len();
    if n > 4 && word.ends_with("ies") {
        return Some(format!("{}y", &word[..n - 3]));
    }
    if n > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return Some(word[..n - 1].to_string());
    }
    Some(word.to_string())
}

/// Split text into scoring terms, preserving order and duplicates.
pub fn terms(text: &str) -> Vec<String> {
    words(text)
        .iter()
        .filter_map(|w| normalize_term(w))
        .collect()
}

/// Unique scoring terms in first-occurrence order.
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    terms(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Lowercase and collapse whitespace. Used for cache keys.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when `phrase` occurs as a contiguous word sequence in `haystack`.
pub fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Adjacent term pairs, used to reward ordered matches.
pub fn bigrams(terms: &[String]) -> Vec<(String, String)> {
    terms
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect()
}

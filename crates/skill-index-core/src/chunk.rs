//! Section-aware text chunker.
//!
//! Splits a document body into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Headings (`#`, `##`, `###`) start a new section and
//! are never crossed; inside a section, paragraphs (`\n\n`) are packed into
//! a buffer until the next one would overflow.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split the body into sections at heading lines outside code fences.
//!    Text before the first heading becomes the `"intro"` section.
//! 3. Within a section, accumulate paragraphs until adding the next would
//!    exceed `max_chars`, then flush.
//! 4. A single paragraph longer than `max_chars` is hard-split at the
//!    nearest newline or space boundary.
//! 5. Every chunk gets a deterministic UUIDv5 id, a SHA-256 text hash and
//!    its term statistics.
//!
//! # Example
//!
//! ```rust
//! use skill_index_core::chunk::chunk_document;
//!
//! let chunks = chunk_document("swift/a.md", "swift", "Intro.\n\n# Actors\n\nIsolation.", 400);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].section, "intro");
//! assert_eq!(chunks[1].section, "Actors");
//! ```

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::lexical::term_stats;
use crate::models::Chunk;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Label for text that precedes the first heading.
pub const INTRO_SECTION: &str = "intro";

static HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#{1,3}\s+(\S.*?)\s*#*\s*$").ok());

/// Estimated token count of `text`: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split a document body into chunks, section by section.
///
/// Returns chunks with contiguous indices starting at 0. A blank body
/// yields no chunks.
///
/// # Guarantees
///
/// - `token_count <= max_tokens` for every chunk.
/// - No chunk spans two sections.
/// - Output is a pure function of the arguments (ids included).
pub fn chunk_document(
    document_id: &str,
    topic_id: &str,
    body: &str,
    max_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();

    for (section, text) in split_sections(body) {
        for piece in pack_paragraphs(&text, max_chars) {
            let index = chunks.len() as i64;
            chunks.push(make_chunk(document_id, topic_id, index, &section, &piece));
        }
    }

    chunks
}

/// Split markdown into `(section label, section text)` pairs.
///
/// The heading line stays at the top of its section's text.
pub fn split_sections(body: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut label = INTRO_SECTION.to_string();
    let mut buf = String::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let heading = if in_fence {
            None
        } else {
            heading_label(line)
        };

        if let Some(next) = heading {
            if !buf.trim().is_empty() {
                sections.push((label, std::mem::take(&mut buf)));
            }
            buf.clear();
            label = next;
        }

        buf.push_str(line);
        buf.push('\n');
    }

    if !buf.trim().is_empty() {
        sections.push((label, buf));
    }

    sections
}

fn heading_label(line: &str) -> Option<String> {
    let re = HEADING.as_ref()?;
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Pack paragraphs into pieces of at most `max_chars` bytes.
fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
}

/// Split an oversized paragraph at newline or space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, pieces: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        // Always make progress, even on a single wide char.
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// SHA-256 of `text` as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document_id: &str, topic_id: &str, index: i64, section: &str, text: &str) -> Chunk {
    let hash = content_hash(text.as_bytes());
    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}:{}", document_id, index, hash).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        document_id: document_id.to_string(),
        topic_id: topic_id.to_string(),
        chunk_index: index,
        section: section.to_string(),
        text: text.to_string(),
        token_count: estimate_tokens(text),
        hash,
        embedding: None,
        terms: term_stats(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_document("t/a.md", "t", "Hello, world!", 400);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].section, INTRO_SECTION);
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_document("t/a.md", "t", "", 400).is_empty());
        assert!(chunk_document("t/a.md", "t", "\n\n  \n", 400).is_empty());
    }

    #[test]
    fn test_headings_start_sections() {
        let text = "# Actors\n\nActors isolate state.\n\n## Reentrancy\n\nAwait may interleave.";
        let chunks = chunk_document("t/a.md", "t", text, 400);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section, "Actors");
        assert!(chunks[0].text.starts_with("# Actors"));
        assert_eq!(chunks[1].section, "Reentrancy");
        assert!(!chunks[0].text.contains("interleave"));
    }

    #[test]
    fn test_heading_inside_code_fence_is_ignored() {
        let text = "# Shell\n\n```sh\n# not a heading\nls\n```\n\nDone.";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, "Shell");
    }

    #[test]
    fn test_deep_headings_do_not_split() {
        let sections = split_sections("## Top\n\ntext\n\n#### Deep\n\nmore");
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_paragraphs_exceed_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_document("t/a.md", "t", text, 6);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.token_count <= 6);
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(200);
        let chunks = chunk_document("t/a.md", "t", &text, 10);
        assert!(chunks.len() > 10);
        assert!(chunks.iter().all(|c| c.token_count <= 10));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_document("t/a.md", "t", text, 3);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.token_count <= 3));
    }

    #[test]
    fn test_deterministic_ids() {
        let text = "# A\n\nAlpha\n\n# B\n\nBeta";
        let c1 = chunk_document("t/a.md", "t", text, 5);
        let c2 = chunk_document("t/a.md", "t", text, 5);
        assert_eq!(c1, c2);
        let other = chunk_document("t/b.md", "t", text, 5);
        assert_ne!(c1[0].id, other[0].id);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    proptest! {
        #[test]
        fn token_cap_holds_for_any_text(
            text in "(#{0,3} )?[a-zé┌ \n]{0,600}(\n\n[a-z .\n]{0,300}){0,4}",
            max_tokens in 1usize..64,
        ) {
            let chunks = chunk_document("t/doc.md", "t", &text, max_tokens);
            for (i, c) in chunks.iter().enumerate() {
                prop_assert!(c.token_count <= max_tokens);
                prop_assert_eq!(c.chunk_index, i as i64);
                prop_assert!(!c.text.trim().is_empty());
            }
        }
    }
}

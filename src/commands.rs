//! CLI command handlers.
//!
//! Each `run_*` function drives one `skix` subcommand against an open
//! [`Engine`] and prints either a human-readable summary or JSON.

use anyhow::Result;
use std::path::PathBuf;

use crate::engine::{Engine, SearchResponse, Status};
use crate::indexer::ReindexReport;
use crate::progress::format_number;

/// Collapse whitespace and cut `text` to at most `max` characters.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_index(engine: &Engine, paths: &[PathBuf], json: bool) -> Result<()> {
    let report = engine.reindex(paths).await?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &ReindexReport) {
    println!("index");
    println!("  indexed:   {}", format_number(report.documents_indexed as u64));
    println!("  unchanged: {}", format_number(report.documents_unchanged as u64));
    println!("  removed:   {}", format_number(report.documents_removed as u64));
    println!("  skipped:   {}", format_number(report.documents_skipped as u64));
    println!("  embedded:  {} chunks", format_number(report.chunks_embedded as u64));
    for error in &report.errors {
        println!("  error: {}", error);
    }
    if report.published {
        println!("  published snapshot v{}", report.snapshot_version);
    } else {
        println!("  no changes (snapshot v{})", report.snapshot_version);
    }
    println!("ok");
}

pub async fn run_search(engine: &Engine, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let response = engine.search(query, top_k).await?;
    if json {
        return print_json(&response);
    }
    print_response(&response);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    println!(
        "{} ({:.0}) in {:.1} ms{}{}",
        response.tier,
        response.confidence,
        response.time_ms,
        if response.from_cache { ", cached" } else { "" },
        if response.degraded { ", lexical-only" } else { "" },
    );
    if !response.expanded_terms.is_empty() {
        println!("  expanded: {}", response.expanded_terms.join(", "));
    }
    println!();

    if response.results.is_empty() {
        if response.flagged_gap {
            println!("No topic covers this query.");
        } else {
            println!("No results.");
        }
        return;
    }

    for (i, r) in response.results.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", i + 1, r.score, r.topic_id, r.section);
        println!("    document: {}", r.document_id);
        println!("    excerpt: \"{}\"", excerpt(&r.text, 160));
        println!();
    }
}

pub async fn run_explain(engine: &Engine, query: &str) -> Result<()> {
    let trace = engine.explain(query).await?;
    print_json(&trace)
}

pub async fn run_context(engine: &Engine, query: &str, max_tokens: usize) -> Result<()> {
    let block = engine.context(query, max_tokens).await?;
    if !block.is_empty() {
        println!("{}", block);
    }
    Ok(())
}

pub fn run_status(engine: &Engine, json: bool) -> Result<()> {
    let status = engine.status();
    if json {
        return print_json(&status);
    }
    print_status(engine, &status);
    Ok(())
}

fn print_status(engine: &Engine, status: &Status) {
    println!("Skill Index — Status");
    println!("====================");
    println!();
    println!("  Snapshot:    {}", engine.config().snapshot.dir.display());
    println!("  Version:     {}", status.snapshot_version);
    println!(
        "  Indexed at:  {}",
        status.last_indexed_at.as_deref().unwrap_or("never")
    );
    println!("  Embeddings:  {}", status.embedding_model);
    println!("  Reranker:    {}", status.reranker);
    println!("  Concepts:    {} relations", status.concept_relations);
    println!();
    println!("  Topics:      {}", status.topic_count);
    println!("  Documents:   {}", status.document_count);
    println!("  Chunks:      {}", status.chunk_count);
    println!(
        "  Embedded:    {} / {} ({}%)",
        status.embedded_count,
        status.chunk_count,
        if status.chunk_count > 0 {
            (status.embedded_count * 100) / status.chunk_count
        } else {
            0
        }
    );
    if status.cache_enabled {
        println!(
            "  Cache:       {} hits, {} misses",
            status.cache_hits, status.cache_misses
        );
    } else {
        println!("  Cache:       disabled");
    }

    if !status.topics.is_empty() {
        println!();
        println!("  By topic:");
        println!(
            "  {:<28} {:>6} {:>8}   {}",
            "TOPIC", "DOCS", "CHUNKS", "DOMAINS"
        );
        println!("  {}", "-".repeat(64));
        for t in &status.topics {
            println!(
                "  {:<28} {:>6} {:>8}   {}",
                t.id,
                t.documents,
                t.chunks,
                t.domains.join(", ")
            );
        }
    }
    println!();
}

pub async fn run_clear(engine: &Engine) -> Result<()> {
    engine.clear().await?;
    println!("Index cleared.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n\n  b", 10), "a b");
        assert_eq!(excerpt("abcdef ghij", 6), "abcdef…");
    }
}

//! Concept graph loading.
//!
//! The active graph comes from `concepts.path` when configured, otherwise
//! from the built-in Swift / SwiftUI / testing / architecture vocabulary
//! below. Whichever is active is written to `concepts.toml` in the
//! snapshot directory so an index can be inspected alongside the graph
//! that shaped its queries.
//!
//! File format:
//!
//! ```toml
//! [[relations]]
//! a = "sendable"
//! b = "data race"
//! weight = 1.0
//!
//! [aliases]
//! vm = "viewmodel"
//! ```

use anyhow::{Context, Result};
use std::path::Path;

use skill_index_core::concepts::{ConceptFile, ConceptGraph};

use crate::config::Config;
use crate::error::EngineError;

pub const CONCEPTS_FILE: &str = "concepts.toml";

const BUILTIN_RELATIONS: &[(&str, &str, f64)] = &[
    // concurrency
    ("sendable", "actor isolation", 1.0),
    ("sendable", "data race", 1.0),
    ("sendable", "crossing boundary", 0.9),
    ("sendable", "thread safety", 0.8),
    ("sendable", "nonisolated", 0.7),
    ("sendable", "@unchecked sendable", 0.8),
    ("actor", "isolation", 1.0),
    ("actor", "actor isolation", 1.0),
    ("actor", "reentrancy", 0.8),
    ("actor", "sendable", 0.9),
    ("actor", "nonisolated", 0.8),
    ("actor", "async", 0.7),
    ("@mainactor", "ui thread", 1.0),
    ("@mainactor", "main thread", 1.0),
    ("@mainactor", "global actor", 0.9),
    ("@mainactor", "isolation domain", 0.8),
    ("@mainactor", "viewmodel", 0.7),
    ("@mainactor", "actor isolation", 0.9),
    ("async", "await", 1.0),
    ("async", "task", 0.9),
    ("async", "suspension point", 0.8),
    ("async", "structured concurrency", 0.8),
    ("async", "async let", 0.9),
    ("async", "concurrency", 1.0),
    ("task", "cancellation", 0.9),
    ("task", "task group", 0.9),
    ("task", "structured concurrency", 0.9),
    ("task", "unstructured task", 0.7),
    ("task", "task.detached", 0.7),
    ("task", "priority", 0.6),
    ("data race", "thread safety", 1.0),
    ("data race", "sendable", 1.0),
    ("data race", "actor isolation", 0.9),
    ("data race", "strict concurrency", 0.9),
    ("data race", "mutable state", 0.8),
    ("swift 6", "strict concurrency", 1.0),
    ("swift 6", "region-based isolation", 0.9),
    ("swift 6", "sendable", 0.9),
    ("swift 6", "breaking changes", 0.8),
    ("swift 6", "migration", 0.9),
    ("continuation", "async", 0.9),
    ("continuation", "callback", 0.9),
    ("continuation", "bridging", 0.8),
    // swiftui
    ("@state", "source of truth", 1.0),
    ("@state", "view update", 0.9),
    ("@state", "private", 0.7),
    ("@state", "@binding", 0.9),
    ("@observable", "observation", 1.0),
    ("@observable", "@state", 0.8),
    ("@observable", "viewmodel", 0.9),
    ("@observable", "ios 17", 0.8),
    ("@observable", "macro", 0.7),
    ("@binding", "two-way binding", 1.0),
    ("@binding", "child view", 0.8),
    ("@binding", "@state", 0.9),
    ("@environment", "dependency injection", 0.9),
    ("@environment", "environment values", 1.0),
    ("@environment", "view hierarchy", 0.8),
    ("navigationstack", "navigation", 1.0),
    ("navigationstack", "navigationpath", 0.9),
    ("navigationstack", "programmatic navigation", 0.9),
    ("navigationstack", "deep link", 0.7),
    ("navigationstack", "ios 16", 0.7),
    ("viewmodel", "mvvm", 1.0),
    ("viewmodel", "@observable", 0.9),
    ("viewmodel", "business logic", 0.9),
    ("viewmodel", "@mainactor", 0.8),
    ("viewmodel", "separation of concerns", 0.8),
    ("performance", "lazy loading", 0.9),
    ("performance", "identity", 0.8),
    ("performance", "equatable", 0.8),
    ("performance", "redraw", 0.9),
    ("performance", "profiling", 0.7),
    // testing
    ("@test", "swift testing", 1.0),
    ("@test", "#expect", 0.9),
    ("@test", "@suite", 0.8),
    ("@test", "parameterized", 0.8),
    ("#expect", "assertion", 1.0),
    ("#expect", "swift testing", 0.9),
    ("#expect", "xctest", 0.6),
    ("mock", "test double", 1.0),
    ("mock", "stub", 0.8),
    ("mock", "protocol", 0.9),
    ("mock", "dependency injection", 0.8),
    ("xctest", "unit test", 1.0),
    ("xctest", "xctestcase", 1.0),
    ("xctest", "xcassertion", 0.9),
    ("xctest", "swift testing", 0.7),
    // architecture
    ("mvvm", "viewmodel", 1.0),
    ("mvvm", "separation of concerns", 0.9),
    ("mvvm", "data binding", 0.8),
    ("mvvm", "testability", 0.8),
    ("clean architecture", "use case", 0.9),
    ("clean architecture", "repository", 0.9),
    ("clean architecture", "dependency inversion", 0.9),
    ("clean architecture", "testability", 0.8),
    ("dependency injection", "protocol", 0.9),
    ("dependency injection", "testability", 0.9),
    ("dependency injection", "inversion of control", 0.9),
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("di", "dependency injection"),
    ("vm", "viewmodel"),
    ("s6", "swift 6"),
    ("tca", "the composable architecture"),
    ("async/await", "async"),
    ("mainactor", "@mainactor"),
    ("observable", "@observable"),
    ("state", "@state"),
];

pub fn builtin_graph() -> ConceptGraph {
    let mut graph = ConceptGraph::new();
    for (a, b, weight) in BUILTIN_RELATIONS {
        graph.add_relation(a, b, *weight);
    }
    for (alias, canonical) in BUILTIN_ALIASES {
        graph.add_alias(alias, canonical);
    }
    graph
}

/// Read and validate a concept file.
pub fn load_graph(path: &Path) -> Result<ConceptGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read concept graph: {}", path.display()))?;
    let file: ConceptFile = toml::from_str(&content).map_err(|e| {
        EngineError::Config(format!(
            "Failed to parse concept graph {}: {}",
            path.display(),
            e
        ))
    })?;
    validate(&file)?;
    Ok(ConceptGraph::from_file(&file))
}

fn validate(file: &ConceptFile) -> Result<(), EngineError> {
    for r in &file.relations {
        if !(r.weight > 0.0 && r.weight <= 1.0) {
            return Err(EngineError::Config(format!(
                "concept relation {} -> {} has weight {}, must be in (0.0, 1.0]",
                r.a, r.b, r.weight
            )));
        }
        if r.a.trim().is_empty() || r.b.trim().is_empty() {
            return Err(EngineError::Config(
                "concept relation with an empty term".to_string(),
            ));
        }
    }
    Ok(())
}

/// The graph selected by `config`.
pub fn active_graph(config: &Config) -> Result<ConceptGraph> {
    match &config.concepts.path {
        Some(path) => load_graph(path),
        None => Ok(builtin_graph()),
    }
}

/// Write `graph` to `<dir>/concepts.toml`.
pub fn save_graph(graph: &ConceptGraph, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let content = toml::to_string_pretty(&graph.to_file())
        .context("Failed to serialize concept graph")?;
    let path = dir.join(CONCEPTS_FILE);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

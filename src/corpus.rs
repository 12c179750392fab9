//! Corpus discovery.
//!
//! Every immediate sub-directory of a corpus root is a topic; every file
//! under it that matches the include globs is a document. A topic's
//! `SKILL.md` carries its manifest as YAML front matter:
//!
//! ```markdown
//! ---
//! name: Swift Concurrency
//! description: Actors, Sendable and structured concurrency.
//! domains: [swift, concurrency]
//! triggers: ["data race", "sendable"]
//! examples: ["how do I fix a Sendable warning"]
//! anti_examples: ["swiftui animation"]
//! ---
//! ```
//!
//! `SKILL.md` is also indexed as a regular document (front matter
//! stripped).

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use skill_index_core::chunk::content_hash;
use skill_index_core::models::Topic;

use crate::config::CorpusConfig;
use crate::error::EngineError;

pub const MANIFEST_FILE: &str = "SKILL.md";

/// Longest manifest description taken from the document body.
const DESCRIPTION_FALLBACK_CHARS: usize = 200;

/// One source file read from disk.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// `"<topic_id>/<path relative to the topic dir>"`.
    pub id: String,
    pub topic_id: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`.
    pub hash: String,
}

impl SourceDocument {
    /// Document text without its front matter.
    pub fn body(&self) -> Result<&str, EngineError> {
        let text = std::str::from_utf8(&self.bytes).map_err(|e| EngineError::Index {
            document: self.id.clone(),
            reason: format!("not valid UTF-8: {}", e),
        })?;
        let (_, body) = split_front_matter(text).map_err(|reason| EngineError::Index {
            document: self.id.clone(),
            reason,
        })?;
        Ok(body)
    }
}

/// What a scan found inside its scope.
#[derive(Debug, Default)]
pub struct CorpusScan {
    /// Every topic under every root, regardless of scope. Sorted by id.
    pub topics: Vec<Topic>,
    /// In-scope documents, sorted by id.
    pub documents: Vec<SourceDocument>,
    /// Documents and manifests that could not be read.
    pub errors: Vec<EngineError>,
}

/// The part of the corpus a reindex looks at.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Full,
    /// Absolute paths, each inside a corpus root.
    Paths(Vec<PathBuf>),
}

impl Scope {
    pub fn contains(&self, path: &Path) -> bool {
        match self {
            Scope::Full => true,
            Scope::Paths(paths) => paths.iter().any(|p| path.starts_with(p)),
        }
    }

    /// Whether anything under `dir` can be in scope.
    fn reaches(&self, dir: &Path) -> bool {
        match self {
            Scope::Full => true,
            Scope::Paths(paths) => paths.iter().any(|p| p.starts_with(dir) || dir.starts_with(p)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    domains: Option<Vec<String>>,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    anti_examples: Vec<String>,
}

pub struct Corpus {
    roots: Vec<PathBuf>,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl Corpus {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let roots = config
            .roots
            .iter()
            .map(std::path::absolute)
            .collect::<std::io::Result<Vec<_>>>()?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());

        Ok(Self {
            roots,
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Turn user-supplied paths into a scope. Every path must lie inside a
    /// corpus root; it does not have to exist (a deleted file is a valid
    /// scope for removal).
    pub fn resolve_scope(&self, paths: &[PathBuf]) -> Result<Scope, EngineError> {
        if paths.is_empty() {
            return Ok(Scope::Full);
        }
        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            let abs = std::path::absolute(path).map_err(|e| {
                EngineError::InvalidRequest(format!("cannot resolve {}: {}", path.display(), e))
            })?;
            if !self.roots.iter().any(|r| abs.starts_with(r)) {
                return Err(EngineError::InvalidRequest(format!(
                    "{} is outside every corpus root",
                    path.display()
                )));
            }
            resolved.push(abs);
        }
        Ok(Scope::Paths(resolved))
    }

    /// Read topic manifests and the in-scope documents.
    ///
    /// Unreadable documents are reported in [`CorpusScan::errors`] and
    /// skipped.
    pub fn scan(&self, scope: &Scope) -> CorpusScan {
        let mut scan = CorpusScan::default();
        let mut topics: BTreeMap<String, Topic> = BTreeMap::new();
        let mut seen_docs: HashSet<String> = HashSet::new();

        for root in &self.roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "corpus root does not exist, skipping");
                continue;
            }

            for topic_dir in self.topic_dirs(root) {
                let Some(topic_id) = topic_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                else {
                    continue;
                };

                let manifest_ok = match read_manifest(&topic_id, &topic_dir) {
                    Ok(topic) => {
                        topics.entry(topic_id.clone()).or_insert(topic);
                        true
                    }
                    Err(e) => {
                        warn!(topic = %topic_id, error = %e, "invalid topic manifest");
                        topics
                            .entry(topic_id.clone())
                            .or_insert_with(|| Topic::bare(&topic_id));
                        if scope.contains(&topic_dir.join(MANIFEST_FILE)) {
                            scan.errors.push(e);
                        }
                        false
                    }
                };

                if !scope.reaches(&topic_dir) {
                    continue;
                }

                for path in self.topic_files(root, &topic_dir) {
                    if !scope.contains(&path) {
                        continue;
                    }
                    let relative = path.strip_prefix(&topic_dir).unwrap_or(&path);
                    let rel_str = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if !manifest_ok && rel_str == MANIFEST_FILE {
                        continue;
                    }
                    let id = format!("{}/{}", topic_id, rel_str);
                    if !seen_docs.insert(id.clone()) {
                        scan.errors.push(EngineError::Index {
                            document: id,
                            reason: format!("duplicate document id from {}", path.display()),
                        });
                        continue;
                    }

                    match std::fs::read(&path) {
                        Ok(bytes) => {
                            let hash = content_hash(&bytes);
                            scan.documents.push(SourceDocument {
                                id,
                                topic_id: topic_id.clone(),
                                path,
                                bytes,
                                hash,
                            });
                        }
                        Err(e) => scan.errors.push(EngineError::Index {
                            document: id,
                            reason: e.to_string(),
                        }),
                    }
                }
            }
        }

        scan.topics = topics.into_values().collect();
        scan.documents.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            topics = scan.topics.len(),
            documents = scan.documents.len(),
            errors = scan.errors.len(),
            "corpus scanned"
        );
        scan
    }

    fn topic_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir() && !is_hidden(e.file_name()))
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                !self.exclude.is_match(format!("{}/", name))
                    && !self.exclude.is_match(format!("{}/x", name))
            })
            .map(|e| e.into_path())
            .collect();
        dirs.sort();
        dirs
    }

    fn topic_files(&self, root: &Path, topic_dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(topic_dir)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable corpus entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) {
                continue;
            }
            if !self.include.is_match(&rel_str) {
                continue;
            }
            files.push(entry.into_path());
        }
        files.sort();
        files
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Split `---` fenced front matter from the body.
///
/// Text without an opening fence has no front matter. An opening fence
/// without a closing one is an error.
pub fn split_front_matter(text: &str) -> std::result::Result<(Option<&str>, &str), String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((None, text));
    };
    if first.trim_end() != "---" {
        return Ok((None, text));
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &text[start..offset];
            let body = &text[offset + line.len()..];
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err("unterminated front matter block".to_string())
}

/// Topic for `dir`, from its `SKILL.md` front matter when present.
fn read_manifest(topic_id: &str, dir: &Path) -> Result<Topic, EngineError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(Topic::bare(topic_id));
    }
    let document = format!("{}/{}", topic_id, MANIFEST_FILE);
    let index_err = |reason: String| EngineError::Index {
        document: document.clone(),
        reason,
    };

    let bytes = std::fs::read(&path).map_err(|e| index_err(e.to_string()))?;
    let text =
        std::str::from_utf8(&bytes).map_err(|e| index_err(format!("not valid UTF-8: {}", e)))?;
    let (yaml, body) = split_front_matter(text).map_err(index_err)?;

    let manifest: Manifest = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)
            .map_err(|e| index_err(format!("malformed front matter: {}", e)))?,
        _ => Manifest::default(),
    };

    Ok(topic_from_manifest(topic_id, manifest, body))
}

fn topic_from_manifest(topic_id: &str, manifest: Manifest, body: &str) -> Topic {
    let description = manifest
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| first_prose_line(body));
    let domains = manifest
        .domains
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| vec![topic_id.to_string()]);

    Topic {
        id: topic_id.to_string(),
        name: manifest
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| topic_id.to_string()),
        description,
        domains,
        triggers: manifest.triggers,
        examples: manifest.examples,
        anti_examples: manifest.anti_examples,
    }
}

fn first_prose_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.chars().take(DESCRIPTION_FALLBACK_CHARS).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus(root: &Path) -> Corpus {
        Corpus::new(&CorpusConfig {
            roots: vec![root.to_path_buf()],
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        })
        .unwrap()
    }

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_split_front_matter() {
        let (yaml, body) = split_front_matter("---\nname: x\n---\n# Body\n").unwrap();
        assert_eq!(yaml, Some("name: x\n"));
        assert_eq!(body, "# Body\n");

        let (yaml, body) = split_front_matter("# No front matter\n").unwrap();
        assert!(yaml.is_none());
        assert_eq!(body, "# No front matter\n");

        assert!(split_front_matter("---\nname: x\n# never closed\n").is_err());
    }

    #[test]
    fn test_scan_reads_manifest_and_documents() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(
            &root.join("swift-concurrency/SKILL.md"),
            b"---\nname: Swift Concurrency\ndomains: [swift]\ntriggers: [\"data race\"]\n---\n# Overview\n\nActors.\n",
        );
        write(&root.join("swift-concurrency/refs/actors.md"), b"# Actors\n\nIsolation.\n");
        write(&root.join("swift-concurrency/notes.txt"), b"ignored");
        write(&root.join("testing/guide.md"), b"Use #expect for assertions.\n");
        write(&root.join(".hidden/x.md"), b"hidden");

        let scan = corpus(root).scan(&Scope::Full);
        let ids: Vec<_> = scan.topics.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["swift-concurrency", "testing"]);

        let swift = &scan.topics[0];
        assert_eq!(swift.name, "Swift Concurrency");
        assert_eq!(swift.triggers, vec!["data race"]);
        assert_eq!(swift.description, "Actors.");

        let testing = &scan.topics[1];
        assert_eq!(testing.name, "testing");
        assert_eq!(testing.domains, vec!["testing"]);

        let docs: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            docs,
            vec![
                "swift-concurrency/SKILL.md",
                "swift-concurrency/refs/actors.md",
                "testing/guide.md"
            ]
        );
        assert!(scan.errors.is_empty());
        assert_eq!(scan.documents[0].body().unwrap(), "# Overview\n\nActors.\n");
    }

    #[test]
    fn test_malformed_manifest_is_reported() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("broken/SKILL.md"), b"---\nname: [unclosed\n---\nbody\n");
        write(&root.join("broken/page.md"), b"still indexed\n");

        let scan = corpus(root).scan(&Scope::Full);
        assert_eq!(scan.topics[0].name, "broken");
        assert_eq!(scan.errors.len(), 1);
        let docs: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(docs, vec!["broken/page.md"]);
    }

    #[test]
    fn test_invalid_utf8_body_is_an_index_error() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("t/bad.md"), &[0xff, 0xfe, 0x00]);
        let scan = corpus(tmp.path()).scan(&Scope::Full);
        assert!(matches!(
            scan.documents[0].body(),
            Err(EngineError::Index { .. })
        ));
    }

    #[test]
    fn test_scope_limits_documents() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("a/one.md"), b"one");
        write(&root.join("b/two.md"), b"two");

        let corpus = corpus(root);
        let scope = corpus.resolve_scope(&[root.join("b")]).unwrap();
        let scan = corpus.scan(&scope);
        assert_eq!(scan.topics.len(), 2);
        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].id, "b/two.md");
    }

    #[test]
    fn test_scope_outside_roots_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let corpus = corpus(tmp.path());
        let err = corpus.resolve_scope(&[other.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}

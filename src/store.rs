//! Snapshot persistence.
//!
//! The published snapshot lives in `<snapshot.dir>/index.sqlite`. A save
//! replaces every row inside one transaction, so a crash mid-write leaves
//! the previous snapshot intact. Derived statistics (BM25 document
//! frequencies, topic fingerprints) are not stored; they are rebuilt when
//! the snapshot is loaded.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use skill_index_core::embedding::{blob_to_vec, vec_to_blob};
use skill_index_core::models::{Chunk, DocumentRecord, TermStats, Topic};
use skill_index_core::snapshot::Snapshot;

use crate::concepts::CONCEPTS_FILE;
use crate::db;
use crate::error::{EngineError, Result};
use crate::migrate;

pub struct Store {
    pool: SqlitePool,
    dir: PathBuf,
}

fn internal(e: impl Into<anyhow::Error>) -> EngineError {
    EngineError::Internal(e.into())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(internal)
}

impl Store {
    /// Open the database in `dir`, creating tables as needed.
    pub async fn open(dir: &Path) -> Result<Self> {
        let pool = db::connect(dir).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the persisted snapshot, or an empty one when nothing was ever
    /// published.
    pub async fn load(&self) -> Result<Snapshot> {
        let meta = sqlx::query(
            "SELECT version, published_at, embedding_model FROM snapshot_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(meta) = meta else {
            return Ok(Snapshot::empty());
        };
        let version: i64 = meta.get("version");
        let published_at: Option<String> = meta.get("published_at");
        let embedding_model: String = meta.get("embedding_model");

        let mut topics = Vec::new();
        for row in sqlx::query("SELECT manifest_json FROM topics")
            .fetch_all(&self.pool)
            .await?
        {
            let json: String = row.get("manifest_json");
            let topic: Topic = serde_json::from_str(&json).map_err(internal)?;
            topics.push(topic);
        }

        let mut documents = BTreeMap::new();
        for row in sqlx::query("SELECT id, topic_id, path, hash, indexed_at FROM documents")
            .fetch_all(&self.pool)
            .await?
        {
            let indexed_at: String = row.get("indexed_at");
            let record = DocumentRecord {
                id: row.get("id"),
                topic_id: row.get("topic_id"),
                path: row.get("path"),
                hash: row.get("hash"),
                indexed_at: parse_time(&indexed_at)?,
            };
            documents.insert(record.id.clone(), record);
        }

        let rows = sqlx::query(
            "SELECT id, document_id, topic_id, chunk_index, section, text, token_count, \
             hash, terms_json, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            let terms_json: String = row.get("terms_json");
            let terms: TermStats = serde_json::from_str(&terms_json).map_err(internal)?;
            let embedding: Option<Vec<u8>> = row.get("embedding");
            let token_count: i64 = row.get("token_count");
            chunks.push(Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                topic_id: row.get("topic_id"),
                chunk_index: row.get("chunk_index"),
                section: row.get("section"),
                text: row.get("text"),
                token_count: token_count.max(0) as usize,
                hash: row.get("hash"),
                embedding: embedding.map(|b| blob_to_vec(&b)),
                terms,
            });
        }

        debug!(
            version,
            topics = topics.len(),
            documents = documents.len(),
            chunks = chunks.len(),
            "snapshot loaded"
        );

        Ok(Snapshot::assemble(
            version.max(0) as u64,
            published_at.as_deref().map(parse_time).transpose()?,
            embedding_model,
            topics,
            documents,
            chunks,
        ))
    }

    /// Replace the persisted snapshot with `snapshot` in one transaction.
    pub async fn save(&self, snapshot: &Snapshot, config_json: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM topics").execute(&mut *tx).await?;

        for topic in &snapshot.topics {
            let json = serde_json::to_string(topic).map_err(internal)?;
            sqlx::query("INSERT INTO topics (id, manifest_json) VALUES (?, ?)")
                .bind(&topic.id)
                .bind(json)
                .execute(&mut *tx)
                .await?;
        }

        for doc in snapshot.documents.values() {
            sqlx::query(
                "INSERT INTO documents (id, topic_id, path, hash, indexed_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(&doc.topic_id)
            .bind(&doc.path)
            .bind(&doc.hash)
            .bind(doc.indexed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        for chunk in &snapshot.chunks {
            let terms_json = serde_json::to_string(&chunk.terms).map_err(internal)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, topic_id, chunk_index, section, text,
                                    token_count, hash, terms_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.topic_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.section)
            .bind(&chunk.text)
            .bind(chunk.token_count as i64)
            .bind(&chunk.hash)
            .bind(terms_json)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO snapshot_meta (id, version, published_at, embedding_model, config_json)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                published_at = excluded.published_at,
                embedding_model = excluded.embedding_model,
                config_json = excluded.config_json
            "#,
        )
        .bind(snapshot.version as i64)
        .bind(snapshot.published_at.map(|t| t.to_rfc3339()))
        .bind(&snapshot.embedding_model)
        .bind(config_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete every persisted row and the saved concept graph.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM topics").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM snapshot_meta")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let concepts = self.dir.join(CONCEPTS_FILE);
        if concepts.exists() {
            std::fs::remove_file(&concepts).map_err(internal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_index_core::chunk::chunk_document;
    use tempfile::TempDir;

    fn snapshot(version: u64) -> Snapshot {
        let mut chunks = chunk_document("a/x.md", "a", "# Actors\n\nIsolation rules.", 400);
        chunks[0].embedding = Some(vec![0.25, -0.5, 1.0]);
        let mut docs = BTreeMap::new();
        docs.insert(
            "a/x.md".to_string(),
            DocumentRecord {
                id: "a/x.md".to_string(),
                topic_id: "a".to_string(),
                path: "/corpus/a/x.md".to_string(),
                hash: "abc".to_string(),
                indexed_at: Utc::now(),
            },
        );
        Snapshot::assemble(
            version,
            Some(Utc::now()),
            "hash-256".to_string(),
            vec![Topic {
                triggers: vec!["actor".to_string()],
                ..Topic::bare("a")
            }],
            docs,
            chunks,
        )
    }

    #[tokio::test]
    async fn test_fresh_store_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.version, 0);
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_is_identical() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).await.unwrap();
        let original = snapshot(4);
        store.save(&original, "{}").await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.version, 4);
        assert_eq!(loaded.published_at, original.published_at);
        assert_eq!(loaded.embedding_model, "hash-256");
        assert_eq!(loaded.topics, original.topics);
        assert_eq!(loaded.documents, original.documents);
        assert_eq!(loaded.chunks, original.chunks);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_rows() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).await.unwrap();
        store.save(&snapshot(1), "{}").await.unwrap();
        store
            .save(
                &Snapshot::assemble(
                    2,
                    None,
                    "disabled".to_string(),
                    Vec::new(),
                    BTreeMap::new(),
                    Vec::new(),
                ),
                "{}",
            )
            .await
            .unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.version, 2);
        assert!(loaded.chunks.is_empty());
        assert!(loaded.topics.is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_to_empty() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).await.unwrap();
        store.save(&snapshot(1), "{}").await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap().version, 0);
    }
}

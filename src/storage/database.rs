//! SQLite database management with migrations
//!
//! Holds the chunk corpus, its FTS5 index and embeddings, and serves the
//! lexical, vector and chunk lookups the search pipeline needs.

use crate::error::{HubseekError, Result};
use crate::retrieval::ScoreMap;
use crate::storage::{
    ChunkEnrichment, ChunkStore, ChunkText, IndexError, LexicalIndex, LlmCache, VectorIndex,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Per-connection settings, applied to every pooled connection
const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
    PRAGMA cache_size = -64000;
";

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the index database
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| HubseekError::Io {
                    source: e,
                    context: format!("Failed to create database directory: {:?}", parent),
                })?;
            }
        }

        let manager =
            SqliteConnectionManager::file(db_path).with_init(|conn| conn.execute_batch(PRAGMAS));

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| HubseekError::Config(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// LLM response cache backed by this database
    pub fn llm_cache(&self, ttl: Duration) -> LlmCache {
        LlmCache::new(self.pool.clone(), ttl)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Row counts for the indexed corpus
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(DbStats {
            namespace_count: count("namespaces")?,
            doc_count: count("docs")?,
            chunk_count: count("chunks")?,
            embedding_count: count("chunk_embeddings")?,
            cached_llm_responses: count("llm_cache")?,
        })
    }

    fn bm25(&self, query: &str, top_k: usize, namespace_id: Option<i64>) -> Result<ScoreMap> {
        let Some(expr) = fts_query(query) else {
            return Ok(ScoreMap::new());
        };
        let conn = self.get_conn()?;
        let limit = top_k as i64;

        let mut scores = ScoreMap::new();
        let mut collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<()> {
            let chunk_id: i64 = row.get(0)?;
            let raw: f64 = row.get(1)?;
            // bm25() is lower-is-better
            scores.insert(chunk_id, -raw);
            Ok(())
        };

        match namespace_id {
            Some(ns) => {
                let mut stmt = conn.prepare(
                    "SELECT chunks_fts.rowid, bm25(chunks_fts, 8.0, 4.0, 1.0, 2.0, 3.0) AS score
                     FROM chunks_fts
                     JOIN chunks c ON c.chunk_id = chunks_fts.rowid
                     JOIN docs d ON d.doc_id = c.doc_id
                     WHERE chunks_fts MATCH ?1 AND d.namespace_id = ?2
                     ORDER BY score
                     LIMIT ?3",
                )?;
                let mut rows = stmt.query(params![expr, ns, limit])?;
                while let Some(row) = rows.next()? {
                    collect(row)?;
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT rowid, bm25(chunks_fts, 8.0, 4.0, 1.0, 2.0, 3.0) AS score
                     FROM chunks_fts
                     WHERE chunks_fts MATCH ?1
                     ORDER BY score
                     LIMIT ?2",
                )?;
                let mut rows = stmt.query(params![expr, limit])?;
                while let Some(row) = rows.next()? {
                    collect(row)?;
                }
            }
        }

        Ok(scores)
    }

    fn knn(&self, query: &[f32], top_k: usize) -> Result<ScoreMap> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT chunk_id, vector FROM chunk_embeddings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut hits: Vec<(i64, f64)> = Vec::new();
        for row in rows {
            let (chunk_id, blob) = row?;
            let vector = decode_vector(&blob);
            if vector.len() != query.len() {
                continue;
            }
            if let Some(distance) = cosine_distance(query, &vector) {
                hits.push((chunk_id, 1.0 / (1.0 + distance)));
            }
        }

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(top_k);

        Ok(hits.into_iter().collect())
    }

    fn chunk_texts(&self, chunk_ids: &[i64]) -> Result<Vec<ChunkText>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = vec!["?"; chunk_ids.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT chunk_id, text FROM chunks WHERE chunk_id IN ({})",
            placeholders
        ))?;
        let mut by_id: HashMap<i64, String> = stmt
            .query_map(params_from_iter(chunk_ids.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        // keep the caller's order
        Ok(chunk_ids
            .iter()
            .filter_map(|id| {
                by_id.remove(id).map(|text| ChunkText {
                    chunk_id: *id,
                    text,
                })
            })
            .collect())
    }

    fn enrichment(&self, chunk_id: i64) -> Result<Option<ChunkEnrichment>> {
        let conn = self.get_conn()?;
        let enrichment = conn
            .query_row(
                "SELECT c.chunk_id, d.doc_path, COALESCE(d.title, ''), COALESCE(c.heading_path, ''),
                        c.start_line, c.end_line, n.name, c.text
                 FROM chunks c
                 JOIN docs d ON d.doc_id = c.doc_id
                 JOIN namespaces n ON n.namespace_id = d.namespace_id
                 WHERE c.chunk_id = ?1",
                params![chunk_id],
                |row| {
                    Ok(ChunkEnrichment {
                        chunk_id: row.get(0)?,
                        doc_path: row.get(1)?,
                        title: row.get(2)?,
                        heading_path: row.get(3)?,
                        start_line: row.get(4)?,
                        end_line: row.get(5)?,
                        namespace_name: row.get(6)?,
                        text: row.get(7)?,
                    })
                },
            )
            .optional()?;

        Ok(enrichment)
    }
}

impl LexicalIndex for Database {
    fn search_bm25(
        &self,
        query: &str,
        top_k: usize,
        namespace_id: Option<i64>,
    ) -> std::result::Result<ScoreMap, IndexError> {
        self.bm25(query, top_k, namespace_id)
            .map_err(|e| IndexError::Lexical(e.to_string()))
    }
}

impl VectorIndex for Database {
    fn search_knn(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> std::result::Result<ScoreMap, IndexError> {
        self.knn(vector, top_k)
            .map_err(|e| IndexError::Vector(e.to_string()))
    }
}

impl ChunkStore for Database {
    fn fetch_chunk_texts(
        &self,
        chunk_ids: &[i64],
    ) -> std::result::Result<Vec<ChunkText>, IndexError> {
        self.chunk_texts(chunk_ids)
            .map_err(|e| IndexError::Lookup(e.to_string()))
    }

    fn fetch_enrichment(
        &self,
        chunk_id: i64,
    ) -> std::result::Result<Option<ChunkEnrichment>, IndexError> {
        self.enrichment(chunk_id)
            .map_err(|e| IndexError::Lookup(e.to_string()))
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub namespace_count: usize,
    pub doc_count: usize,
    pub chunk_count: usize,
    pub embedding_count: usize,
    pub cached_llm_responses: usize,
}

/// Turn free text into an FTS5 expression: every word quoted, joined by OR.
///
/// Returns `None` when the text has no searchable terms.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Little-endian f32 blob, the `chunk_embeddings.vector` format
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `1 - cos(a, b)`, `None` if either vector has zero length
fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: corpus and indexes
    r#"
    CREATE TABLE namespaces (
        namespace_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL DEFAULT 'root' CHECK(kind IN ('submodule', 'directory', 'root')),
        discovered_at INTEGER NOT NULL DEFAULT 0
    );

    INSERT INTO namespaces (namespace_id, name, kind) VALUES (1, 'root', 'root');

    CREATE TABLE docs (
        doc_id INTEGER PRIMARY KEY,
        namespace_id INTEGER NOT NULL DEFAULT 1,
        doc_path TEXT NOT NULL UNIQUE,
        title TEXT,
        content_hash TEXT NOT NULL DEFAULT '',
        indexed_at INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (namespace_id) REFERENCES namespaces(namespace_id)
    );

    CREATE INDEX idx_docs_namespace ON docs(namespace_id);

    CREATE TABLE chunks (
        chunk_id INTEGER PRIMARY KEY,
        doc_id INTEGER NOT NULL,
        chunk_index INTEGER NOT NULL DEFAULT 0,
        heading_path TEXT,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        text TEXT NOT NULL,
        FOREIGN KEY (doc_id) REFERENCES docs(doc_id) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_doc_id ON chunks(doc_id);

    -- rowid is the chunk id
    CREATE VIRTUAL TABLE chunks_fts USING fts5(
        title,
        heading_path,
        body,
        tags,
        properties,
        tokenize = 'unicode61 remove_diacritics 2'
    );

    CREATE TABLE chunk_embeddings (
        chunk_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id) ON DELETE CASCADE
    );
    "#,
    // Migration 2: LLM response cache
    r#"
    CREATE TABLE llm_cache (
        cache_key TEXT PRIMARY KEY,
        result_json TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    "#,
];

//! Storage layer for hubseek
//!
//! Defines the collaborators the search pipeline reads from (lexical index,
//! vector index, chunk store) and a SQLite implementation of all three.
//! Populating the index is left to the ingestion side.

pub mod cache;
pub mod database;

use crate::retrieval::ScoreMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::LlmCache;
pub use database::{Database, DbPool, DbStats};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Lexical search failed: {0}")]
    Lexical(String),

    #[error("Vector search failed: {0}")]
    Vector(String),

    #[error("Chunk lookup failed: {0}")]
    Lookup(String),
}

/// Lexical (BM25-like) search, higher score is better
pub trait LexicalIndex: Send + Sync {
    fn search_bm25(
        &self,
        query: &str,
        top_k: usize,
        namespace_id: Option<i64>,
    ) -> Result<ScoreMap, IndexError>;
}

/// Nearest-neighbour search over chunk embeddings, higher similarity is better
pub trait VectorIndex: Send + Sync {
    fn search_knn(&self, vector: &[f32], top_k: usize) -> Result<ScoreMap, IndexError>;
}

/// Resolves chunk ids to text and provenance
pub trait ChunkStore: Send + Sync {
    /// Texts for the given ids; unknown ids are omitted
    fn fetch_chunk_texts(&self, chunk_ids: &[i64]) -> Result<Vec<ChunkText>, IndexError>;

    /// Provenance for one chunk, `None` if it no longer exists
    fn fetch_enrichment(&self, chunk_id: i64) -> Result<Option<ChunkEnrichment>, IndexError>;
}

/// Chunk id and body text, as handed to the reranker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkText {
    pub chunk_id: i64,
    pub text: String,
}

/// Document provenance of a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEnrichment {
    pub chunk_id: i64,
    pub doc_path: String,
    pub title: String,
    pub heading_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub namespace_name: String,
    pub text: String,
}

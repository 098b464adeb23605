//! Ranked results and their provenance

use crate::storage::ChunkEnrichment;
use serde::{Deserialize, Serialize};

/// Maximum snippet length in characters
pub const SNIPPET_CHARS: usize = 200;

/// Fusion output for one chunk, before enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: i64,

    /// Score the final ordering is based on
    pub final_score: f64,

    /// Max-normalized lexical contribution (0 when lexical was not used)
    pub lex_norm: f64,

    /// Max-normalized vector contribution (0 when vector was not used)
    pub vec_norm: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f64>,
}

impl RankedResult {
    /// Result carried straight from RRF, without normalized source scores
    pub fn from_rrf(chunk_id: i64, rrf_score: f64) -> Self {
        Self {
            chunk_id,
            final_score: rrf_score,
            lex_norm: 0.0,
            vec_norm: 0.0,
            rrf_score: Some(rrf_score),
            reranker_score: None,
        }
    }
}

/// A ranked chunk with document provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_id: i64,
    pub doc_path: String,
    pub title: String,
    /// Heading trail inside the document, empty at document root
    pub heading_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub namespace_name: String,

    pub final_score: f64,
    pub lex_norm: f64,
    pub vec_norm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f64>,

    pub snippet: String,
    pub text: String,
}

impl SearchResult {
    pub fn new(ranked: &RankedResult, enrichment: ChunkEnrichment) -> Self {
        Self {
            chunk_id: ranked.chunk_id,
            doc_path: enrichment.doc_path,
            title: enrichment.title,
            heading_path: enrichment.heading_path,
            start_line: enrichment.start_line,
            end_line: enrichment.end_line,
            namespace_name: enrichment.namespace_name,
            final_score: ranked.final_score,
            lex_norm: ranked.lex_norm,
            vec_norm: ranked.vec_norm,
            rrf_score: ranked.rrf_score,
            reranker_score: ranked.reranker_score,
            snippet: snippet(&enrichment.text, SNIPPET_CHARS),
            text: enrichment.text,
        }
    }

    /// `doc_path:start-end`
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.doc_path, self.start_line, self.end_line)
    }
}

/// First `max_chars` characters, with `...` appended when truncated
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

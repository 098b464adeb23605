//! Multi-stage search and rank fusion
//!
//! Classic search (hybrid / bm25-only / vec-only) fuses one lexical and one
//! vector result set. Deep search runs an eight stage pipeline with strong
//! signal detection, LLM query expansion, multi-query Reciprocal Rank Fusion,
//! LLM re-ranking and position-aware blending.

mod blending;
mod deep;
mod fusion;
mod hybrid;
mod provenance;
mod response;
mod rrf;
mod strong_signal;

pub use blending::position_aware_blend;
pub use fusion::linear_fusion;
pub use hybrid::{HybridSearcher, SearchBackends};
pub use provenance::{RankedResult, SearchResult, SNIPPET_CHARS};
pub use response::{PipelineStageInfo, SearchResponse, SkipReason, Stage};
pub use rrf::{
    ranks_from_scores, reciprocal_rank_fusion, RankedEntry, RankingList, RrfResult,
    DEFAULT_RRF_K, RANK_1_BONUS, RANK_2_3_BONUS,
};
pub use strong_signal::{detect_strong_signal, StrongSignal};

use crate::error::{HubseekError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Chunk id to score, higher is better
pub type ScoreMap = HashMap<i64, f64>;

/// Weight of ranking lists produced by the user's own query
pub const ORIGINAL_QUERY_WEIGHT: f64 = 2.0;

/// Weight of ranking lists produced by LLM expansions
pub const EXPANDED_QUERY_WEIGHT: f64 = 1.0;

/// Search mode requested by the caller, or actually used after degradation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    #[serde(rename = "bm25_only")]
    Bm25Only,
    VecOnly,
    Deep,
}

/// Backend that can fail during classic search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Lexical,
    Vector,
}

/// Outcome of a backend failure in a given mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Keep searching in this mode
    Continue(SearchMode),
    /// Stop and return an empty response in the current mode
    Abort,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Bm25Only => "bm25_only",
            SearchMode::VecOnly => "vec_only",
            SearchMode::Deep => "deep",
        }
    }

    pub fn uses_lexical(&self) -> bool {
        matches!(self, SearchMode::Hybrid | SearchMode::Bm25Only)
    }

    pub fn uses_vector(&self) -> bool {
        matches!(self, SearchMode::Hybrid | SearchMode::VecOnly)
    }

    /// Degradation table for classic search.
    ///
    /// Hybrid falls back to the surviving backend; a single-source mode
    /// whose only backend failed aborts.
    pub fn on_failure(self, backend: Backend) -> Transition {
        match (self, backend) {
            (SearchMode::Hybrid, Backend::Lexical) => Transition::Continue(SearchMode::VecOnly),
            (SearchMode::Hybrid, Backend::Vector) => Transition::Continue(SearchMode::Bm25Only),
            (SearchMode::Bm25Only, Backend::Lexical) => Transition::Abort,
            (SearchMode::VecOnly, Backend::Vector) => Transition::Abort,
            (mode, _) => Transition::Continue(mode),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = HubseekError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "hybrid" => Ok(SearchMode::Hybrid),
            "bm25_only" | "bm25" => Ok(SearchMode::Bm25Only),
            "vec_only" | "vec" | "vector" => Ok(SearchMode::VecOnly),
            "deep" => Ok(SearchMode::Deep),
            other => Err(HubseekError::InvalidRequest(format!(
                "Unknown search mode '{}'",
                other
            ))),
        }
    }
}

/// Search request; immutable for the duration of a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Maximum number of results; falls back to the configured default
    pub top_k: Option<usize>,

    /// Restrict lexical candidates to one namespace
    pub namespace_id: Option<i64>,

    pub mode: SearchMode,

    /// Deep mode: never call the LLM for query expansion
    pub skip_expansion: bool,

    /// Deep mode: never call the LLM for re-ranking
    pub skip_reranking: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            namespace_id: None,
            mode: SearchMode::Hybrid,
            skip_expansion: false,
            skip_reranking: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_namespace(mut self, namespace_id: i64) -> Self {
        self.namespace_id = Some(namespace_id);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn skip_expansion(mut self, skip: bool) -> Self {
        self.skip_expansion = skip;
        self
    }

    pub fn skip_reranking(mut self, skip: bool) -> Self {
        self.skip_reranking = skip;
        self
    }
}

//! Search response and deep pipeline diagnostics

use crate::retrieval::{SearchMode, SearchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Deep pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitialBm25,
    StrongSignalCheck,
    QueryExpansion,
    MultiQuerySearch,
    RrfFusion,
    LlmReranking,
    PositionAwareBlending,
    Enrichment,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::InitialBm25,
        Stage::StrongSignalCheck,
        Stage::QueryExpansion,
        Stage::MultiQuerySearch,
        Stage::RrfFusion,
        Stage::LlmReranking,
        Stage::PositionAwareBlending,
        Stage::Enrichment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InitialBm25 => "initial_bm25",
            Stage::StrongSignalCheck => "strong_signal_check",
            Stage::QueryExpansion => "query_expansion",
            Stage::MultiQuerySearch => "multi_query_search",
            Stage::RrfFusion => "rrf_fusion",
            Stage::LlmReranking => "llm_reranking",
            Stage::PositionAwareBlending => "position_aware_blending",
            Stage::Enrichment => "enrichment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not do its work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UserRequested,
    StrongSignalDetected,
    LlmUnavailable,
    NoCandidates,
    RerankNotApplied,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UserRequested => "user_requested",
            SkipReason::StrongSignalDetected => "strong_signal_detected",
            SkipReason::LlmUnavailable => "llm_unavailable",
            SkipReason::NoCandidates => "no_candidates",
            SkipReason::RerankNotApplied => "rerank_not_applied",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record for one deep pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageInfo {
    pub name: Stage,
    pub duration_ms: u64,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl PipelineStageInfo {
    pub(crate) fn ran(name: Stage, started: Instant) -> Self {
        Self {
            name,
            duration_ms: elapsed_ms(started),
            skipped: false,
            skip_reason: None,
        }
    }

    pub(crate) fn with_skip(name: Stage, started: Instant, reason: Option<SkipReason>) -> Self {
        Self {
            name,
            duration_ms: elapsed_ms(started),
            skipped: reason.is_some(),
            skip_reason: reason,
        }
    }
}

/// Search response returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,

    /// Mode actually used, which may differ from the request after degradation
    pub search_mode: SearchMode,

    /// Fused candidate count before the final top-k truncation
    pub total_candidates: usize,

    pub duration_ms: u64,

    /// Non-fatal problems encountered along the way
    pub warnings: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_queries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strong_signal_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_applied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_stages: Option<Vec<PipelineStageInfo>>,
}

impl SearchResponse {
    pub(crate) fn classic(
        results: Vec<SearchResult>,
        search_mode: SearchMode,
        total_candidates: usize,
        started: Instant,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            results,
            search_mode,
            total_candidates,
            duration_ms: elapsed_ms(started),
            warnings,
            expanded_queries: None,
            strong_signal_detected: None,
            rerank_applied: None,
            pipeline_stages: None,
        }
    }

    pub(crate) fn empty(search_mode: SearchMode, started: Instant, warnings: Vec<String>) -> Self {
        Self::classic(Vec::new(), search_mode, 0, started, warnings)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

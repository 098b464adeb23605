//! Search orchestration: classic hybrid search and dispatch to deep search

use crate::config::{FusionMethod, SearchConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{HubseekError, Result};
use crate::llm::LlmProvider;
use crate::retrieval::{
    linear_fusion, reciprocal_rank_fusion, Backend, RankedResult, RankingList, ScoreMap,
    SearchMode, SearchRequest, SearchResponse, SearchResult, Transition,
};
use crate::storage::{ChunkStore, Database, LexicalIndex, VectorIndex};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Weight of each list when the classic path fuses with RRF
const CLASSIC_RRF_WEIGHT: f64 = 1.0;

/// Characters of a query quoted in warnings
const QUOTED_QUERY_CHARS: usize = 50;

/// Everything the searcher reads from. All handles are shared and read-only.
#[derive(Clone)]
pub struct SearchBackends {
    pub lexical: Arc<dyn LexicalIndex>,
    pub vector: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn ChunkStore>,
}

impl SearchBackends {
    /// Lexical, vector and chunk lookups all served by one SQLite index
    pub fn from_database(
        database: Arc<Database>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            lexical: database.clone(),
            vector: database.clone(),
            embedder,
            llm,
            store: database,
        }
    }
}

/// Hybrid searcher over lexical and vector backends with optional LLM help
pub struct HybridSearcher {
    pub(super) backends: SearchBackends,
    pub(super) config: SearchConfig,
}

impl HybridSearcher {
    pub fn new(backends: SearchBackends, config: SearchConfig) -> Self {
        Self { backends, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a search.
    ///
    /// Backend failures never surface as errors: they degrade the mode or
    /// skip a stage and are reported in `warnings`. Only malformed requests
    /// (blank query, `top_k` of zero) are rejected.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(HubseekError::InvalidRequest(
                "Query text cannot be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Err(HubseekError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }

        let candidate_k = top_k.saturating_mul(self.config.candidate_multiplier.max(1));

        debug!(
            mode = %request.mode,
            top_k,
            candidate_k,
            "Searching for {:?}",
            query
        );

        let response = match request.mode {
            SearchMode::Deep => {
                self.deep_search(request, query, top_k, candidate_k, started)
                    .await
            }
            mode => self.classic_search(request, query, mode, top_k, candidate_k, started),
        };

        debug!(
            mode = %response.search_mode,
            results = response.results.len(),
            total_candidates = response.total_candidates,
            duration_ms = response.duration_ms,
            "Search finished"
        );

        Ok(response)
    }

    fn classic_search(
        &self,
        request: &SearchRequest,
        query: &str,
        requested: SearchMode,
        top_k: usize,
        candidate_k: usize,
        started: Instant,
    ) -> SearchResponse {
        let mut mode = requested;
        let mut warnings = Vec::new();
        let mut lex_scores: Option<ScoreMap> = None;
        let mut vec_scores: Option<ScoreMap> = None;

        if mode.uses_lexical() {
            match self.lexical_scores(query, candidate_k, request.namespace_id) {
                Ok(scores) => lex_scores = Some(scores),
                Err(message) => {
                    push_warning(&mut warnings, format!("BM25 search failed: {}", message));
                    match mode.on_failure(Backend::Lexical) {
                        Transition::Continue(next) => mode = next,
                        Transition::Abort => {
                            return SearchResponse::empty(mode, started, warnings)
                        }
                    }
                }
            }
        }

        if mode.uses_vector() {
            match self.vector_scores(query, candidate_k) {
                Ok(scores) => vec_scores = Some(scores),
                Err(message) => {
                    push_warning(&mut warnings, format!("Vector search failed: {}", message));
                    match mode.on_failure(Backend::Vector) {
                        Transition::Continue(next) => mode = next,
                        Transition::Abort => {
                            return SearchResponse::empty(mode, started, warnings)
                        }
                    }
                }
            }
        }

        if mode != requested {
            debug!("Degraded from {} to {}", requested, mode);
        }

        let mut fused = match (
            self.config.fusion_method,
            lex_scores.as_ref(),
            vec_scores.as_ref(),
        ) {
            (FusionMethod::Rrf, Some(lex), Some(vec)) => {
                let rankings = [
                    RankingList::from_scores(lex, CLASSIC_RRF_WEIGHT),
                    RankingList::from_scores(vec, CLASSIC_RRF_WEIGHT),
                ];
                reciprocal_rank_fusion(&rankings, self.config.rrf_k)
                    .into_iter()
                    .map(|r| RankedResult::from_rrf(r.chunk_id, r.rrf_score))
                    .collect()
            }
            _ => {
                let lex_weight = if mode == SearchMode::VecOnly {
                    0.0
                } else {
                    self.config.weights.lexical
                };
                let vec_weight = if mode == SearchMode::Bm25Only {
                    0.0
                } else {
                    self.config.weights.vector
                };
                linear_fusion(lex_scores.as_ref(), vec_scores.as_ref(), lex_weight, vec_weight)
            }
        };

        let total_candidates = fused.len();
        fused.truncate(top_k);

        let results = self.enrich(&fused, &mut warnings);

        SearchResponse::classic(results, mode, total_candidates, started, warnings)
    }

    /// Lexical scores, or the failure as a message
    pub(super) fn lexical_scores(
        &self,
        query: &str,
        top_k: usize,
        namespace_id: Option<i64>,
    ) -> std::result::Result<ScoreMap, String> {
        self.backends
            .lexical
            .search_bm25(query, top_k, namespace_id)
            .map_err(|e| e.to_string())
    }

    /// Embed the query and search the vector index; either step may fail
    pub(super) fn vector_scores(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<ScoreMap, String> {
        let vector = self
            .backends
            .embedder
            .embed(query)
            .map_err(|e| format!("embedding failed: {}", e))?;

        self.backends
            .vector
            .search_knn(&vector, top_k)
            .map_err(|e| e.to_string())
    }

    /// Attach provenance. Chunks that no longer exist are dropped.
    pub(super) fn enrich(
        &self,
        ranked: &[RankedResult],
        warnings: &mut Vec<String>,
    ) -> Vec<SearchResult> {
        ranked
            .iter()
            .filter_map(|r| match self.backends.store.fetch_enrichment(r.chunk_id) {
                Ok(Some(enrichment)) => Some(SearchResult::new(r, enrichment)),
                Ok(None) => {
                    debug!("Chunk {} vanished before enrichment", r.chunk_id);
                    None
                }
                Err(e) => {
                    push_warning(
                        warnings,
                        format!("Enrichment failed for chunk {}: {}", r.chunk_id, e),
                    );
                    None
                }
            })
            .collect()
    }
}

/// Record a non-fatal problem in the response and the log
pub(super) fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

/// Query text shortened for warnings
pub(super) fn quoted(query: &str) -> String {
    query.chars().take(QUOTED_QUERY_CHARS).collect()
}

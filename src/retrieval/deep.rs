//! Deep search: the eight stage pipeline
//!
//! 1. initial_bm25            lexical search for the original query
//! 2. strong_signal_check     decide whether expansion is worth it
//! 3. query_expansion         LLM alternative phrasings
//! 4. multi_query_search      lexical + vector for every query
//! 5. rrf_fusion              weighted RRF over all ranking lists
//! 6. llm_reranking           LLM relevance for the top candidates
//! 7. position_aware_blending mix RRF rank and relevance
//! 8. enrichment              provenance lookup
//!
//! Every stage is recorded even when skipped. Failures become warnings.

use super::hybrid::{push_warning, quoted, HybridSearcher};
use crate::retrieval::{
    detect_strong_signal, position_aware_blend, reciprocal_rank_fusion, PipelineStageInfo,
    RankedResult, RankingList, RrfResult, ScoreMap, SearchMode, SearchRequest, SearchResponse,
    SkipReason, Stage, EXPANDED_QUERY_WEIGHT, ORIGINAL_QUERY_WEIGHT,
};
use crate::retrieval::response::elapsed_ms;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// Stage records collected in execution order
struct StageLog(Vec<PipelineStageInfo>);

impl StageLog {
    fn push(&mut self, info: PipelineStageInfo) {
        debug!(
            stage = %info.name,
            duration_ms = info.duration_ms,
            skipped = info.skipped,
            reason = info.skip_reason.map(|r| r.as_str()).unwrap_or(""),
            "Deep search stage"
        );
        self.0.push(info);
    }
}

impl HybridSearcher {
    pub(super) async fn deep_search(
        &self,
        request: &SearchRequest,
        query: &str,
        top_k: usize,
        candidate_k: usize,
        started: Instant,
    ) -> SearchResponse {
        let mut warnings = Vec::new();
        let mut stages = StageLog(Vec::with_capacity(Stage::ALL.len()));
        // asked at most once per search
        let mut llm_available: Option<bool> = None;

        // 1. initial_bm25
        let t = Instant::now();
        let initial = match self.lexical_scores(query, candidate_k, request.namespace_id) {
            Ok(scores) => scores,
            Err(message) => {
                push_warning(
                    &mut warnings,
                    format!("Initial BM25 search failed: {}", message),
                );
                ScoreMap::new()
            }
        };
        stages.push(PipelineStageInfo::ran(Stage::InitialBm25, t));

        // 2. strong_signal_check
        let t = Instant::now();
        let signal = detect_strong_signal(
            &initial,
            self.config.strong_signal_min_score,
            self.config.strong_signal_min_gap,
        );
        stages.push(PipelineStageInfo::ran(Stage::StrongSignalCheck, t));

        // 3. query_expansion
        let t = Instant::now();
        let skip = if request.skip_expansion {
            Some(SkipReason::UserRequested)
        } else if signal.detected {
            Some(SkipReason::StrongSignalDetected)
        } else if !self.llm_available(&mut llm_available).await {
            Some(SkipReason::LlmUnavailable)
        } else {
            None
        };
        let mut expanded_queries = Vec::new();
        if skip.is_none() {
            match self.backends.llm.expand_query(query).await {
                Ok(expansions) => {
                    expanded_queries = expansions
                        .into_iter()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .collect();
                }
                Err(e) => push_warning(&mut warnings, format!("Query expansion failed: {}", e)),
            }
        }
        stages.push(PipelineStageInfo::with_skip(Stage::QueryExpansion, t, skip));

        // 4. multi_query_search
        let t = Instant::now();
        let rankings = self.multi_query_rankings(
            query,
            &expanded_queries,
            candidate_k,
            request.namespace_id,
            &mut warnings,
        );
        stages.push(PipelineStageInfo::ran(Stage::MultiQuerySearch, t));

        // 5. rrf_fusion
        let t = Instant::now();
        let mut fused = reciprocal_rank_fusion(&rankings, self.config.rrf_k);
        let total_candidates = fused.len();
        fused.truncate(self.config.rerank_candidate_limit);
        stages.push(PipelineStageInfo::ran(Stage::RrfFusion, t));

        // 6. llm_reranking
        let t = Instant::now();
        let skip = if request.skip_reranking {
            Some(SkipReason::UserRequested)
        } else if !self.llm_available(&mut llm_available).await {
            Some(SkipReason::LlmUnavailable)
        } else if fused.is_empty() {
            Some(SkipReason::NoCandidates)
        } else {
            None
        };
        let reranker_scores = match skip {
            None => self.rerank(query, &fused, &mut warnings).await,
            Some(_) => None,
        };
        let rerank_applied = reranker_scores.is_some();
        stages.push(PipelineStageInfo::with_skip(Stage::LlmReranking, t, skip));

        // 7. position_aware_blending
        let t = Instant::now();
        let mut ranked: Vec<RankedResult> = match &reranker_scores {
            Some(scores) => position_aware_blend(&fused, scores, self.config.rerank_blending),
            None => fused
                .iter()
                .map(|r| RankedResult::from_rrf(r.chunk_id, r.rrf_score))
                .collect(),
        };
        ranked.truncate(top_k);
        let skip = (!rerank_applied).then_some(SkipReason::RerankNotApplied);
        stages.push(PipelineStageInfo::with_skip(
            Stage::PositionAwareBlending,
            t,
            skip,
        ));

        // 8. enrichment
        let t = Instant::now();
        let results = self.enrich(&ranked, &mut warnings);
        stages.push(PipelineStageInfo::ran(Stage::Enrichment, t));

        SearchResponse {
            results,
            search_mode: SearchMode::Deep,
            total_candidates,
            duration_ms: elapsed_ms(started),
            warnings,
            expanded_queries: (!expanded_queries.is_empty()).then_some(expanded_queries),
            strong_signal_detected: Some(signal.detected),
            rerank_applied: Some(rerank_applied),
            pipeline_stages: Some(stages.0),
        }
    }

    async fn llm_available(&self, checked: &mut Option<bool>) -> bool {
        if let Some(available) = *checked {
            return available;
        }
        let available = self.backends.llm.is_available().await;
        debug!(
            provider = self.backends.llm.provider_id(),
            available, "Checked LLM availability"
        );
        *checked = Some(available);
        available
    }

    /// One ranking list per (query, backend) pair that produced results.
    /// The original query weighs double.
    fn multi_query_rankings(
        &self,
        query: &str,
        expanded: &[String],
        candidate_k: usize,
        namespace_id: Option<i64>,
        warnings: &mut Vec<String>,
    ) -> Vec<RankingList> {
        let queries = std::iter::once((query, ORIGINAL_QUERY_WEIGHT))
            .chain(expanded.iter().map(|q| (q.as_str(), EXPANDED_QUERY_WEIGHT)));

        let mut rankings = Vec::new();
        for (text, weight) in queries {
            match self.lexical_scores(text, candidate_k, namespace_id) {
                Ok(scores) if !scores.is_empty() => {
                    rankings.push(RankingList::from_scores(&scores, weight))
                }
                Ok(_) => {}
                Err(message) => push_warning(
                    warnings,
                    format!("BM25 search failed for query \"{}\": {}", quoted(text), message),
                ),
            }

            match self.vector_scores(text, candidate_k) {
                Ok(scores) if !scores.is_empty() => {
                    rankings.push(RankingList::from_scores(&scores, weight))
                }
                Ok(_) => {}
                Err(message) => push_warning(
                    warnings,
                    format!("Vector search failed for query \"{}\": {}", quoted(text), message),
                ),
            }
        }

        rankings
    }

    /// Reranker scores keyed by chunk id, or `None` when nothing was scored
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RrfResult],
        warnings: &mut Vec<String>,
    ) -> Option<HashMap<i64, f64>> {
        let ids: Vec<i64> = candidates.iter().map(|r| r.chunk_id).collect();
        let texts = match self.backends.store.fetch_chunk_texts(&ids) {
            Ok(texts) => texts,
            Err(e) => {
                push_warning(warnings, format!("Re-ranking failed: {}", e));
                return None;
            }
        };
        if texts.is_empty() {
            debug!("No candidate texts to rerank");
            return None;
        }

        match self.backends.llm.rerank(query, &texts).await {
            Ok(scores) if !scores.is_empty() => Some(
                scores
                    .into_iter()
                    .map(|s| (s.chunk_id, s.relevance_score))
                    .collect(),
            ),
            Ok(_) => {
                debug!("Reranker returned no scores");
                None
            }
            Err(e) => {
                push_warning(warnings, format!("Re-ranking failed: {}", e));
                None
            }
        }
    }
}

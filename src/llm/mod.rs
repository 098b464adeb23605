//! LLM query expansion and reranking
//!
//! The deep search path asks an LLM for alternative phrasings of the query
//! and for relevance scores of the top candidates. Both are optional: the
//! searcher checks `is_available` and carries on without them.

mod http;
mod parse;

pub use http::{HttpLlmProvider, RerankStrategy};
pub use parse::extract_json_array;

use crate::config::LlmConfig;
use crate::storage::{ChunkText, LlmCache};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM provider is disabled")]
    Disabled,
}

/// Relevance of one candidate chunk, in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub chunk_id: i64,
    pub relevance_score: f64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn is_available(&self) -> bool;

    /// Alternative phrasings of `query`. Usually two, possibly none.
    async fn expand_query(&self, query: &str) -> Result<Vec<String>, LlmError>;

    /// Scores for some or all of `candidates`; unscored ones are omitted
    async fn rerank(
        &self,
        query: &str,
        candidates: &[ChunkText],
    ) -> Result<Vec<RerankScore>, LlmError>;
}

/// Build the provider named in the config
pub fn from_config(
    config: &LlmConfig,
    cache: Option<LlmCache>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if !config.is_enabled() {
        return Ok(Arc::new(NullLlmProvider));
    }

    let provider = HttpLlmProvider::new(config)?;
    Ok(Arc::new(match cache {
        Some(cache) => provider.with_cache(cache),
        None => provider,
    }))
}

/// Stand-in when no LLM is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLlmProvider;

#[async_trait]
impl LlmProvider for NullLlmProvider {
    fn provider_id(&self) -> &str {
        "none"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn expand_query(&self, _query: &str) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }

    async fn rerank(
        &self,
        _query: &str,
        _candidates: &[ChunkText],
    ) -> Result<Vec<RerankScore>, LlmError> {
        Ok(Vec::new())
    }
}

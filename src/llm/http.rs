//! OpenAI-compatible LLM provider
//!
//! Works against any server exposing `/chat/completions` (OpenAI, Ollama,
//! vLLM, LiteLLM). Reranking can instead go through a dedicated `/rerank`
//! endpoint (Jina/Cohere style).

use super::parse::extract_json_array;
use super::{LlmError, LlmProvider, RerankScore};
use crate::config::LlmConfig;
use crate::storage::{ChunkText, LlmCache};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Characters of each candidate shown to the reranker
const RERANK_TEXT_CHARS: usize = 500;

/// Expansions kept from one call
const MAX_EXPANSIONS: usize = 2;

const EXPAND_SYSTEM_PROMPT: &str = "You are a search query expansion assistant. Given a search query, \
generate exactly 2 alternative search queries that capture different aspects or phrasings of the same \
intent. Return ONLY a JSON array of 2 strings, no other text.";

const RERANK_SYSTEM_PROMPT: &str = "You are a relevance scoring assistant. Score how relevant each \
document is to the query.\nReturn a JSON array where each element has \"id\" (the document ID number) \
and \"score\" (0.0 to 1.0 relevance score).\nReturn ONLY the JSON array, no other text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankStrategy {
    /// Ask the chat model for a JSON list of scores
    Chat,
    /// POST to `{base_url}/rerank`
    Endpoint,
}

impl RerankStrategy {
    fn from_config(value: &str) -> Self {
        match value {
            "endpoint" => RerankStrategy::Endpoint,
            _ => RerankStrategy::Chat,
        }
    }
}

pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    reranker_model: String,
    strategy: RerankStrategy,
    cache: Option<LlmCache>,
    available: OnceCell<bool>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RerankEndpointResponse {
    #[serde(default)]
    results: Vec<RerankEndpointResult>,
}

#[derive(Deserialize)]
struct RerankEndpointResult {
    index: usize,
    #[serde(default)]
    relevance_score: Option<f64>,
}

impl HttpLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            model: config.model.clone(),
            reranker_model: config
                .reranker_model
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            strategy: RerankStrategy::from_config(&config.reranker_strategy),
            cache: None,
            available: OnceCell::new(),
        })
    }

    pub fn with_cache(mut self, cache: LlmCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, path: &str, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self.post(path).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn chat(
        &self,
        model: &str,
        messages: Value,
        temperature: Option<f64>,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(temperature) = temperature {
            body["temperature"] = json!(temperature);
        }

        let completion: ChatCompletion = self.send("chat/completions", &body).await?.json().await?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn ping(&self) -> bool {
        let messages = json!([{ "role": "user", "content": "ping" }]);
        match self.chat(&self.model, messages, None, 1).await {
            Ok(_) => true,
            Err(e) => {
                warn!("LLM at {} is unavailable: {}", self.base_url, e);
                false
            }
        }
    }

    async fn rerank_via_chat(
        &self,
        query: &str,
        candidates: &[ChunkText],
    ) -> Result<Vec<RerankScore>, LlmError> {
        let messages = json!([
            { "role": "system", "content": RERANK_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": format!("Query: \"{}\"\n\nDocuments:\n{}", query, candidate_list(candidates)),
            },
        ]);

        let content = self
            .chat(
                &self.reranker_model,
                messages,
                Some(0.0),
                candidates.len() * 30 + 50,
            )
            .await?;

        Ok(scores_from_chat(&extract_json_array(&content), candidates))
    }

    async fn rerank_via_endpoint(
        &self,
        query: &str,
        candidates: &[ChunkText],
    ) -> Result<Vec<RerankScore>, LlmError> {
        let documents: Vec<String> = candidates
            .iter()
            .map(|c| truncate_chars(&c.text, RERANK_TEXT_CHARS))
            .collect();
        let body = json!({
            "model": self.reranker_model,
            "query": query,
            "documents": documents,
            "top_n": candidates.len(),
        });

        let response: RerankEndpointResponse = self.send("rerank", &body).await?.json().await?;

        Ok(scores_from_endpoint(&response.results, candidates))
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let hit = self.cache.as_ref()?.get(key);
        if hit.is_some() {
            debug!("LLM cache hit {}", key);
        }
        hit
    }

    fn store<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Some(cache) = &self.cache {
            cache.put(key, value);
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn provider_id(&self) -> &str {
        "openai-compatible"
    }

    async fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.ping()).await
    }

    async fn expand_query(&self, query: &str) -> Result<Vec<String>, LlmError> {
        let key = LlmCache::key("expand", &self.model, query);
        if let Some(expansions) = self.cached::<Vec<String>>(&key) {
            return Ok(expansions);
        }

        let messages = json!([
            { "role": "system", "content": EXPAND_SYSTEM_PROMPT },
            { "role": "user", "content": format!("Expand this search query: \"{}\"", query) },
        ]);
        let content = self.chat(&self.model, messages, Some(0.7), 200).await?;

        let expansions: Vec<String> = extract_json_array(&content)
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .take(MAX_EXPANSIONS)
            .collect();

        self.store(&key, &expansions);
        Ok(expansions)
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[ChunkText],
    ) -> Result<Vec<RerankScore>, LlmError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<i64> = candidates.iter().map(|c| c.chunk_id).collect();
        ids.sort_unstable();
        let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
        let key = LlmCache::key(
            "rerank",
            &self.reranker_model,
            &format!("{}::{}", query, ids.join(",")),
        );
        if let Some(scores) = self.cached::<Vec<RerankScore>>(&key) {
            return Ok(scores);
        }

        let scores = match self.strategy {
            RerankStrategy::Chat => self.rerank_via_chat(query, candidates).await?,
            RerankStrategy::Endpoint => self.rerank_via_endpoint(query, candidates).await?,
        };

        self.store(&key, &scores);
        Ok(scores)
    }
}

/// `[n] (ID: id)` headed blocks, one per candidate
fn candidate_list(candidates: &[ChunkText]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] (ID: {})\n{}",
                i + 1,
                c.chunk_id,
                truncate_chars(&c.text, RERANK_TEXT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Read `{"id", "score"}` objects, keeping only ids that were asked about
fn scores_from_chat(items: &[Value], candidates: &[ChunkText]) -> Vec<RerankScore> {
    let known: HashSet<i64> = candidates.iter().map(|c| c.chunk_id).collect();

    items
        .iter()
        .filter_map(|item| {
            let id = match item.get("id")? {
                Value::Number(n) => n.as_i64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            let score = item.get("score")?.as_f64().unwrap_or(0.0);

            known.contains(&id).then(|| RerankScore {
                chunk_id: id,
                relevance_score: score.clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Map `results[].index` back onto candidate ids
fn scores_from_endpoint(
    results: &[RerankEndpointResult],
    candidates: &[ChunkText],
) -> Vec<RerankScore> {
    results
        .iter()
        .filter_map(|r| {
            candidates.get(r.index).map(|c| RerankScore {
                chunk_id: c.chunk_id,
                relevance_score: r.relevance_score.unwrap_or(0.0).clamp(0.0, 1.0),
            })
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<ChunkText> {
        vec![
            ChunkText {
                chunk_id: 7,
                text: "Refresh tokens rotate hourly.".to_string(),
            },
            ChunkText {
                chunk_id: 9,
                text: "x".repeat(800),
            },
        ]
    }

    #[test]
    fn test_strategy_from_config() {
        assert_eq!(RerankStrategy::from_config("endpoint"), RerankStrategy::Endpoint);
        assert_eq!(RerankStrategy::from_config("chat"), RerankStrategy::Chat);
        assert_eq!(RerankStrategy::from_config("anything"), RerankStrategy::Chat);
    }

    #[test]
    fn test_candidate_list_truncates_text() {
        let list = candidate_list(&candidates());
        assert!(list.starts_with("[1] (ID: 7)\nRefresh tokens rotate hourly."));
        assert!(list.contains("[2] (ID: 9)\n"));
        assert!(!list.contains(&"x".repeat(RERANK_TEXT_CHARS + 1)));
    }

    #[test]
    fn test_chat_scores_clamped_and_filtered() {
        let items = vec![
            json!({"id": 7, "score": 1.4}),
            json!({"id": "9", "score": -0.2}),
            json!({"id": 42, "score": 0.8}),
            json!({"id": 7}),
            json!("not an object"),
        ];

        let scores = scores_from_chat(&items, &candidates());

        assert_eq!(
            scores,
            vec![
                RerankScore {
                    chunk_id: 7,
                    relevance_score: 1.0
                },
                RerankScore {
                    chunk_id: 9,
                    relevance_score: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_endpoint_scores_map_indexes() {
        let results = vec![
            RerankEndpointResult {
                index: 1,
                relevance_score: Some(0.6),
            },
            RerankEndpointResult {
                index: 5,
                relevance_score: Some(0.9),
            },
            RerankEndpointResult {
                index: 0,
                relevance_score: None,
            },
        ];

        let scores = scores_from_endpoint(&results, &candidates());

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].chunk_id, 9);
        assert_eq!(scores[0].relevance_score, 0.6);
        assert_eq!(scores[1].chunk_id, 7);
        assert_eq!(scores[1].relevance_score, 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let config = LlmConfig {
            provider: "openai-compatible".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let provider = HttpLlmProvider::new(&config).unwrap();

        assert!(!provider.is_available().await);
        // memoised
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn test_rerank_without_candidates_skips_network() {
        let config = LlmConfig {
            provider: "openai-compatible".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            ..LlmConfig::default()
        };
        let provider = HttpLlmProvider::new(&config).unwrap();

        assert!(provider.rerank("q", &[]).await.unwrap().is_empty());
    }
}

//! Configuration management for hubseek
//!
//! Configuration is resolved once at startup in a fixed order: built-in
//! defaults, then the TOML file, then runtime overrides, then environment
//! variables. The result is validated and treated as read-only afterwards.

use crate::error::{HubseekError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
}

/// Location of the populated index database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub db_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".hubseek").join("index.db"),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String, // "fastembed" or "none"
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// How the classic hybrid path combines lexical and vector scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    Linear,
    Rrf,
}

/// Linear fusion weights (must sum to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub lexical: f64,
    pub vector: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            lexical: 0.7,
            vector: 0.3,
        }
    }
}

/// RRF weight per rank bucket used by position-aware blending.
/// The reranker receives `1 - weight` in each bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendingWeights {
    /// Ranks 1-3
    pub top: f64,
    /// Ranks 4-10
    pub mid: f64,
    /// Ranks 11+
    pub tail: f64,
}

impl Default for BlendingWeights {
    fn default() -> Self {
        Self {
            top: 0.75,
            mid: 0.60,
            tail: 0.40,
        }
    }
}

/// Search pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    /// Candidate pool size is `top_k * candidate_multiplier`
    pub candidate_multiplier: usize,
    pub fusion_method: FusionMethod,
    /// RRF smoothing constant
    pub rrf_k: u32,
    pub strong_signal_min_score: f64,
    pub strong_signal_min_gap: f64,
    pub rerank_candidate_limit: usize,
    pub weights: HybridWeights,
    pub rerank_blending: BlendingWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            candidate_multiplier: 5,
            fusion_method: FusionMethod::Rrf,
            rrf_k: 60,
            strong_signal_min_score: 0.85,
            strong_signal_min_gap: 0.15,
            rerank_candidate_limit: 20,
            weights: HybridWeights::default(),
            rerank_blending: BlendingWeights::default(),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String, // "openai-compatible" or "none"
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_model: Option<String>,
    pub reranker_strategy: String, // "chat" or "endpoint"
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "none"
    }

    /// API key read from `api_key_env`; local servers often need none
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            reranker_model: None,
            reranker_strategy: "chat".to_string(),
            cache_ttl_secs: 3600,
            timeout_secs: 30,
        }
    }
}

/// Runtime overrides for the search section (e.g. from CLI flags)
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub default_top_k: Option<usize>,
    pub candidate_multiplier: Option<usize>,
    pub weights: Option<HybridWeights>,
    pub fusion_method: Option<FusionMethod>,
    pub rrf_k: Option<u32>,
    pub strong_signal_min_score: Option<f64>,
    pub strong_signal_min_gap: Option<f64>,
    pub rerank_candidate_limit: Option<usize>,
    pub rerank_blending: Option<BlendingWeights>,
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        Self::resolve(Some(path), &SearchOverrides::default())
    }

    /// Resolve the effective configuration.
    ///
    /// `path == None` falls back to [`Config::default_path`]; a missing
    /// default file is not an error, a missing explicit file is.
    pub fn resolve(path: Option<&Path>, overrides: &SearchOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!("No config file at {:?}, using defaults", default_path);
                    Self::default()
                }
            }
        };

        config.apply_overrides(overrides);

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Parse a (possibly partial) TOML file over the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HubseekError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HubseekError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HubseekError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| HubseekError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply runtime overrides on top of the file configuration
    pub fn apply_overrides(&mut self, overrides: &SearchOverrides) {
        let search = &mut self.search;
        if let Some(v) = overrides.default_top_k {
            search.default_top_k = v;
        }
        if let Some(v) = overrides.candidate_multiplier {
            search.candidate_multiplier = v;
        }
        if let Some(v) = overrides.weights {
            search.weights = v;
        }
        if let Some(v) = overrides.fusion_method {
            search.fusion_method = v;
        }
        if let Some(v) = overrides.rrf_k {
            search.rrf_k = v;
        }
        if let Some(v) = overrides.strong_signal_min_score {
            search.strong_signal_min_score = v;
        }
        if let Some(v) = overrides.strong_signal_min_gap {
            search.strong_signal_min_gap = v;
        }
        if let Some(v) = overrides.rerank_candidate_limit {
            search.rerank_candidate_limit = v;
        }
        if let Some(v) = overrides.rerank_blending {
            search.rerank_blending = v;
        }
        if let Some(path) = &overrides.db_path {
            self.index.db_path = path.clone();
        }
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HUBSEEK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_vars(std::env::vars());
    }

    /// Apply overrides from an explicit set of `(name, value)` pairs.
    ///
    /// `OPENAI_BASE_URL` is applied first and the `HUBSEEK_*` keys after it,
    /// in name order, so `HUBSEEK_LLM__BASE_URL` wins when both are set.
    pub fn apply_env_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overrides: Vec<(String, String)> = Vec::new();
        for (key, value) in vars {
            if key == "OPENAI_BASE_URL" {
                self.llm.base_url = value;
            } else if key.starts_with("HUBSEEK_") {
                overrides.push((key, value));
            }
        }
        overrides.sort();

        for (key, value) in overrides {
            let config_key = &key["HUBSEEK_".len()..];
            if let Err(e) = self.set_value_from_env(config_key, &value) {
                tracing::warn!("Failed to apply env override {}: {}", key, e);
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "INDEX__DB_PATH" => self.index.db_path = PathBuf::from(value),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "SEARCH__DEFAULT_TOP_K" => self.search.default_top_k = parse_env(path, value)?,
            "SEARCH__CANDIDATE_MULTIPLIER" => {
                self.search.candidate_multiplier = parse_env(path, value)?
            }
            "SEARCH__FUSION_METHOD" => {
                self.search.fusion_method = match value.to_ascii_lowercase().as_str() {
                    "linear" => FusionMethod::Linear,
                    "rrf" => FusionMethod::Rrf,
                    other => {
                        return Err(HubseekError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Unknown fusion method '{}'", other),
                        })
                    }
                }
            }
            "SEARCH__RRF_K" => self.search.rrf_k = parse_env(path, value)?,
            "SEARCH__STRONG_SIGNAL_MIN_SCORE" => {
                self.search.strong_signal_min_score = parse_env(path, value)?
            }
            "SEARCH__STRONG_SIGNAL_MIN_GAP" => {
                self.search.strong_signal_min_gap = parse_env(path, value)?
            }
            "SEARCH__RERANK_CANDIDATE_LIMIT" => {
                self.search.rerank_candidate_limit = parse_env(path, value)?
            }
            "LLM__PROVIDER" => self.llm.provider = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__RERANKER_MODEL" => self.llm.reranker_model = Some(value.to_string()),
            "LLM__RERANKER_STRATEGY" => self.llm.reranker_strategy = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HubseekError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("hubseek").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HubseekError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            rrf_k = 30
            fusion_method = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.search.rrf_k, 30);
        assert_eq!(config.search.fusion_method, FusionMethod::Linear);
        assert_eq!(config.search.default_top_k, 10);
        assert_eq!(config.search.candidate_multiplier, 5);
        assert_eq!(config.llm.provider, "none");
    }

    #[test]
    fn test_partial_nested_tables_merge_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search.rerank_blending]
            top = 0.8

            [search.weights]
            lexical = 0.6
            "#,
        )
        .unwrap();

        let blending = config.search.rerank_blending;
        assert_eq!(blending.top, 0.8);
        assert_eq!(blending.mid, 0.60);
        assert_eq!(blending.tail, 0.40);
        assert_eq!(config.search.weights.lexical, 0.6);
        assert_eq!(config.search.weights.vector, 0.3);
        assert_eq!(config.search.rrf_k, 60);
    }

    #[test]
    fn test_runtime_overrides_beat_file() {
        let mut config = Config::default();
        config.apply_overrides(&SearchOverrides {
            default_top_k: Some(3),
            rrf_k: Some(10),
            ..Default::default()
        });
        assert_eq!(config.search.default_top_k, 3);
        assert_eq!(config.search.rrf_k, 10);
        assert_eq!(config.search.candidate_multiplier, 5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_vars(env(&[
            ("HUBSEEK_SEARCH__RRF_K", "42"),
            ("HUBSEEK_SEARCH__FUSION_METHOD", "linear"),
            ("HUBSEEK_LLM__PROVIDER", "openai-compatible"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1"),
            ("UNRELATED", "x"),
        ]));

        assert_eq!(config.search.rrf_k, 42);
        assert_eq!(config.search.fusion_method, FusionMethod::Linear);
        assert!(config.llm.is_enabled());
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_hubseek_base_url_beats_openai_base_url() {
        for vars in [
            env(&[
                ("HUBSEEK_LLM__BASE_URL", "http://specific:8080/v1"),
                ("OPENAI_BASE_URL", "http://generic:1234/v1"),
            ]),
            env(&[
                ("OPENAI_BASE_URL", "http://generic:1234/v1"),
                ("HUBSEEK_LLM__BASE_URL", "http://specific:8080/v1"),
            ]),
        ] {
            let mut config = Config::default();
            config.apply_env_vars(vars);
            assert_eq!(config.llm.base_url, "http://specific:8080/v1");
        }

        let mut config = Config::default();
        config.apply_env_vars(env(&[("OPENAI_BASE_URL", "http://generic:1234/v1")]));
        assert_eq!(config.llm.base_url, "http://generic:1234/v1");
    }

    #[test]
    fn test_bad_env_value_is_ignored() {
        let mut config = Config::default();
        config.apply_env_vars(env(&[("HUBSEEK_SEARCH__RRF_K", "sixty")]));
        assert_eq!(config.search.rrf_k, 60);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.search.rerank_candidate_limit = 7;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.search.rerank_candidate_limit, 7);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(HubseekError::ConfigNotFound { .. })));
    }
}

use crate::config::{BlendingWeights, Config};
use crate::error::{HubseekError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_search(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HubseekError::ConfigValidation { errors })
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.default_top_k == 0 {
            errors.push(ValidationError::new(
                "search.default_top_k",
                "Default top_k must be greater than 0",
            ));
        }

        if search.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "search.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if search.rrf_k == 0 {
            errors.push(ValidationError::new(
                "search.rrf_k",
                "RRF k must be greater than 0",
            ));
        }

        let weights = search.weights;
        if weights.lexical < 0.0 || weights.vector < 0.0 {
            errors.push(ValidationError::new(
                "search.weights",
                "Weights must be non-negative",
            ));
        }
        if (weights.lexical + weights.vector - 1.0).abs() > 0.001 {
            errors.push(ValidationError::new(
                "search.weights",
                format!(
                    "Weights must sum to 1.0, got {}",
                    weights.lexical + weights.vector
                ),
            ));
        }

        Self::check_unit_range(
            "search.strong_signal_min_score",
            search.strong_signal_min_score,
            errors,
        );
        Self::check_unit_range(
            "search.strong_signal_min_gap",
            search.strong_signal_min_gap,
            errors,
        );

        if search.rerank_candidate_limit == 0 {
            errors.push(ValidationError::new(
                "search.rerank_candidate_limit",
                "Rerank candidate limit must be greater than 0",
            ));
        }

        let BlendingWeights { top, mid, tail } = search.rerank_blending;
        Self::check_unit_range("search.rerank_blending.top", top, errors);
        Self::check_unit_range("search.rerank_blending.mid", mid, errors);
        Self::check_unit_range("search.rerank_blending.tail", tail, errors);
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if provider != "fastembed" && provider != "none" {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!("Provider must be 'fastembed' or 'none', got '{}'", provider),
            ));
        }

        if provider == "fastembed" && config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        let valid_providers = ["openai-compatible", "none"];
        if !valid_providers.contains(&llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, llm.provider
                ),
            ));
        }

        let valid_strategies = ["chat", "endpoint"];
        if !valid_strategies.contains(&llm.reranker_strategy.as_str()) {
            errors.push(ValidationError::new(
                "llm.reranker_strategy",
                format!(
                    "Reranker strategy must be one of {:?}, got '{}'",
                    valid_strategies, llm.reranker_strategy
                ),
            ));
        }

        if llm.is_enabled() {
            if llm.base_url.trim().is_empty() {
                errors.push(ValidationError::new(
                    "llm.base_url",
                    "Base URL cannot be empty when the LLM is enabled",
                ));
            }
            if llm.model.is_empty() {
                errors.push(ValidationError::new(
                    "llm.model",
                    "Model name cannot be empty",
                ));
            }
        }

        if llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn check_unit_range(path: &str, value: f64, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(
                path,
                format!("Value must be between 0.0 and 1.0, got {}", value),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridWeights;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.search.weights = HybridWeights {
            lexical: 0.6,
            vector: 0.6,
        };
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.search.default_top_k = 0;
        config.search.rrf_k = 0;
        config.search.rerank_blending.tail = 1.5;

        match ConfigValidator::validate(&config) {
            Err(HubseekError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert!(paths.contains(&"search.default_top_k"));
                assert!(paths.contains(&"search.rrf_k"));
                assert!(paths.contains(&"search.rerank_blending.tail"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.llm.provider = "carrier-pigeon".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_enabled_llm_needs_base_url() {
        let mut config = Config::default();
        config.llm.provider = "openai-compatible".to_string();
        config.llm.base_url = "  ".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}

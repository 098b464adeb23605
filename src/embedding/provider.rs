/// Embedding provider trait, FastEmbed and null implementations
use crate::config::EmbeddingConfig;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding provider is disabled")]
    Disabled,
}

/// Turns query text into a vector for the vector index
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the provider named in the config.
///
/// A model that fails to load is reported to the caller; `provider = "none"`
/// yields the null provider.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "none" => Ok(Arc::new(NullEmbeddingProvider)),
        _ => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
    }
}

/// Local embedding through FastEmbed
///
/// Models are downloaded to the HuggingFace cache on first use
/// (all-MiniLM-L6-v2 is ~90MB).
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small",
                    model_name
                )));
            }
        };

        tracing::info!("Loading embedding model {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(false);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Provider used when embeddings are turned off. Every call fails, which
/// makes the searcher fall back to lexical results.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbeddingProvider;

impl EmbeddingProvider for NullEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    fn dimension(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

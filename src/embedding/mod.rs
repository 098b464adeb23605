/// Query embedding
///
/// The vector side of hybrid search needs the query as a vector. FastEmbed
/// runs locally; the null provider disables vector search.
mod provider;

pub use provider::{
    from_config, EmbeddingError, EmbeddingProvider, FastEmbedProvider, NullEmbeddingProvider,
};

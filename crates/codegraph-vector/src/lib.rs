//! Embedding providers and semantic search over the code graph.

pub mod error;
pub mod ollama_provider;
pub mod openai_provider;
pub mod providers;
pub mod search;
pub mod service;

pub use error::{Result, VectorError};
pub use ollama_provider::{OllamaConfig, OllamaEmbeddingProvider};
pub use openai_provider::{OpenAiConfig, OpenAiEmbeddingProvider};
pub use providers::{create_provider, model_dimensions, truncate_text, EmbeddingProvider};
pub use search::{
    cosine_similarity, EmbeddingUpdateStats, HybridSearchOptions, SemanticSearchManager,
    SemanticSearchParams, SemanticSearchResult, VectorIndexConfig,
};
pub use service::EmbeddingService;

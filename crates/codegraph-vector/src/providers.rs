use crate::error::{Result, VectorError};
use crate::ollama_provider::{OllamaConfig, OllamaEmbeddingProvider};
use crate::openai_provider::{OpenAiConfig, OpenAiEmbeddingProvider};
use async_trait::async_trait;
use codegraph_core::{EmbeddingProviderKind, EmbeddingSettings};
use std::sync::Arc;
use std::time::Duration;

pub const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
pub const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Text-to-vector backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds `texts` in order, batching as the backend allows.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model(&self) -> &str;

    fn provider_name(&self) -> &str;
}

/// Known dimensionality for a model name, if any.
pub fn model_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        _ => None,
    }
}

/// Shortens text whose estimated token count (chars / 4) exceeds
/// `max_tokens`, keeping `max_tokens * 4` chars and appending `...`.
pub fn truncate_text(text: &str, max_tokens: usize) -> String {
    let chars = text.chars().count();
    if chars / 4 <= max_tokens {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_tokens * 4).collect();
    truncated.push_str("...");
    truncated
}

/// Builds the configured provider; `None` when embeddings are disabled.
pub fn create_provider(settings: &EmbeddingSettings) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match settings.provider {
        EmbeddingProviderKind::Disabled => Ok(None),
        EmbeddingProviderKind::OpenAi => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                VectorError::Provider(
                    "OpenAI API key is required for OpenAI embedding provider".to_string(),
                )
            })?;
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
            let dimensions = settings
                .dimensions
                .or_else(|| model_dimensions(&model))
                .unwrap_or(1536);
            let provider = OpenAiEmbeddingProvider::new(OpenAiConfig {
                api_key,
                model,
                api_base: settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
                dimensions,
                max_tokens: settings.max_tokens,
                batch_size: settings.batch_size.max(1),
                timeout,
                max_retries: 3,
            })?;
            Ok(Some(Arc::new(provider)))
        }
        EmbeddingProviderKind::Ollama => {
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string());
            let dimensions = settings
                .dimensions
                .or_else(|| model_dimensions(&model))
                .unwrap_or(768);
            let provider = OllamaEmbeddingProvider::new(OllamaConfig {
                model,
                base_url: settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_DEFAULT_BASE_URL.to_string()),
                dimensions,
                max_tokens: settings.max_tokens,
                batch_size: settings.batch_size.max(1),
                timeout,
            })?;
            Ok(Some(Arc::new(provider)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn truncation_respects_token_budget() {
        assert_eq!(truncate_text("short", 10), "short");

        let long = "a".repeat(100);
        let truncated = truncate_text(&long, 5);
        assert_eq!(truncated, format!("{}...", "a".repeat(20)));

        // Multi-byte characters are never split.
        let unicode = "é".repeat(50);
        let truncated = truncate_text(&unicode, 2);
        assert_eq!(truncated.chars().count(), 11);
    }

    #[test]
    fn known_model_dimensions() {
        assert_eq!(model_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(model_dimensions("mxbai-embed-large"), Some(1024));
        assert_eq!(model_dimensions("custom"), None);
    }

    #[test]
    fn disabled_settings_yield_no_provider() {
        let provider = create_provider(&EmbeddingSettings::default()).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn openai_requires_api_key() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::OpenAi,
            ..Default::default()
        };
        assert!(matches!(create_provider(&settings), Err(VectorError::Provider(_))));

        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::OpenAi,
            api_key: Some(SecretString::from("sk-test".to_string())),
            model: Some("text-embedding-3-large".into()),
            ..Default::default()
        };
        let provider = create_provider(&settings).unwrap().unwrap();
        assert_eq!(provider.dimensions(), 3072);
        assert_eq!(provider.model(), "text-embedding-3-large");
    }

    #[test]
    fn ollama_defaults() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::Ollama,
            ..Default::default()
        };
        let provider = create_provider(&settings).unwrap().unwrap();
        assert_eq!(provider.model(), OLLAMA_DEFAULT_MODEL);
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.provider_name(), "Ollama");
    }
}

use crate::error::{Result, VectorError};
use crate::providers::{truncate_text, EmbeddingProvider};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
    pub dimensions: usize,
    pub max_tokens: usize,
    /// Number of concurrent single-text requests.
    pub batch_size: usize,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama's `/api/embeddings` endpoint embeds one prompt per request.
pub struct OllamaEmbeddingProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = truncate_text(text, self.config.max_tokens);
        let response = self
            .client
            .post(self.endpoint())
            .json(&OllamaEmbeddingRequest {
                model: &self.config.model,
                prompt: &prompt,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VectorError::Provider(format!("Ollama API error: {}", status)));
        }
        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| VectorError::InvalidResponse(e.to_string()))?;
        if body.embedding.is_empty() {
            return Err(VectorError::InvalidResponse(
                "Ollama returned an empty embedding".to_string(),
            ));
        }
        Ok(body.embedding)
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            debug!("Embedding {} texts with Ollama", chunk.len());
            let batch = try_join_all(chunk.iter().map(|t| self.generate_embedding(t))).await?;
            embeddings.extend(batch);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }
}

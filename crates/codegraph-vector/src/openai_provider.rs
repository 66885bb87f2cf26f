use crate::error::{Result, VectorError};
use crate::providers::{truncate_text, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the OpenAI (or OpenAI-compatible) embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub timeout: Duration,
    pub max_retries: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

pub struct OpenAiEmbeddingProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(VectorError::Provider(
                "OpenAI API key is required for OpenAI embedding provider".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("CodeGraph/1.0")
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.api_base.trim_end_matches('/'))
    }

    /// One embeddings request with exponential-backoff retries.
    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            encoding_format: "float",
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt as u32));
                tokio::time::sleep(delay).await;
            }

            match self.send(&request).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        debug!(
                            "OpenAI returned {} embeddings ({} tokens)",
                            response.data.len(),
                            usage.total_tokens
                        );
                    }
                    return order_embeddings(response, texts.len());
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        warn!(
                            "OpenAI API call failed (attempt {}/{}), retrying: {}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VectorError::Provider("All OpenAI API retry attempts failed".to_string())
        }))
    }

    async fn send(&self, request: &EmbeddingRequest<'_>) -> Result<EmbeddingResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<EmbeddingResponse>()
                .await
                .map_err(|e| {
                    VectorError::InvalidResponse(format!("Failed to parse response: {}", e))
                });
        }

        let message = match response.json::<ApiError>().await {
            Ok(api_error) => format!(
                "OpenAI API error: {} ({})",
                api_error.error.message,
                api_error.error.error_type.unwrap_or_else(|| status.to_string())
            ),
            Err(_) => format!("OpenAI API error: HTTP {}", status),
        };
        Err(VectorError::Provider(message))
    }
}

fn order_embeddings(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(VectorError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|item| item.index);
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let input = vec![truncate_text(text, self.config.max_tokens)];
        self.call_api(&input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VectorError::InvalidResponse("No embedding returned from OpenAI API".to_string())
            })
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let batch: Vec<String> = chunk
                .iter()
                .map(|t| truncate_text(t, self.config.max_tokens))
                .collect();
            embeddings.extend(self.call_api(&batch).await?);
        }
        info!("OpenAI embedded {} texts with {}", texts.len(), self.config.model);
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_base: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_key: SecretString::from("sk-test".to_string()),
            model: "text-embedding-3-small".into(),
            api_base: api_base.into(),
            dimensions: 1536,
            max_tokens: 8000,
            batch_size: 100,
            timeout: Duration::from_secs(2),
            max_retries: 0,
        }
    }

    #[test]
    fn request_body_shape() {
        let input = vec!["fn main".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            encoding_format: "float",
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["fn main"],
                "encoding_format": "float"
            })
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let provider = OpenAiEmbeddingProvider::new(config("http://localhost:1234/v1/")).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:1234/v1/embeddings");
    }

    #[test]
    fn response_is_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"embedding": [2.0], "index": 1},
                {"embedding": [1.0], "index": 0}
            ],
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }))
        .unwrap();
        assert_eq!(order_embeddings(response, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn short_response_is_rejected() {
        let response: EmbeddingResponse =
            serde_json::from_value(serde_json::json!({"data": []})).unwrap();
        assert!(matches!(
            order_embeddings(response, 1),
            Err(VectorError::InvalidResponse(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut cfg = config("http://localhost");
        cfg.api_key = SecretString::from(String::new());
        assert!(OpenAiEmbeddingProvider::new(cfg).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_http_error() {
        let provider = OpenAiEmbeddingProvider::new(config("http://127.0.0.1:9/v1")).unwrap();
        let err = provider.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(err, VectorError::Http(_)));
    }
}

use crate::providers::{create_provider, EmbeddingProvider};
use codegraph_core::{CodeNode, EmbeddingSettings, SemanticEmbedding};
use std::sync::Arc;
use tracing::{error, warn};

pub const EMBEDDING_VERSION: &str = "1.0";

/// Wraps the configured provider and turns raw vectors into
/// [`SemanticEmbedding`]s. Generation failures are logged and yield `None`.
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    settings: EmbeddingSettings,
}

impl EmbeddingService {
    /// A provider that cannot be built leaves the service disabled.
    pub fn from_settings(settings: EmbeddingSettings) -> Self {
        let provider = match create_provider(&settings) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Failed to initialize embedding provider: {}", e);
                None
            }
        };
        Self { provider, settings }
    }

    pub fn with_provider(
        provider: Arc<dyn EmbeddingProvider>,
        settings: EmbeddingSettings,
    ) -> Self {
        Self {
            provider: Some(provider),
            settings,
        }
    }

    pub fn disabled() -> Self {
        Self {
            provider: None,
            settings: EmbeddingSettings::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.provider.as_ref().map(|p| p.dimensions())
    }

    pub fn model(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.model())
    }

    pub async fn generate_embedding(&self, text: &str) -> Option<SemanticEmbedding> {
        let provider = self.provider.as_ref()?;
        match provider.generate_embedding(text).await {
            Ok(vector) => Some(SemanticEmbedding::new(vector, provider.model(), EMBEDDING_VERSION)),
            Err(e) => {
                error!("Failed to generate embedding: {}", e);
                None
            }
        }
    }

    /// One slot per input text; a failed batch yields `None` for each of its texts.
    pub async fn generate_embeddings(&self, texts: &[String]) -> Vec<Option<SemanticEmbedding>> {
        let Some(provider) = self.provider.as_ref() else {
            return vec![None; texts.len()];
        };
        match provider.generate_embeddings(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors
                .into_iter()
                .map(|v| Some(SemanticEmbedding::new(v, provider.model(), EMBEDDING_VERSION)))
                .collect(),
            Ok(vectors) => {
                error!(
                    "Provider returned {} embeddings for {} texts",
                    vectors.len(),
                    texts.len()
                );
                vec![None; texts.len()]
            }
            Err(e) => {
                error!("Failed to generate batch embeddings: {}", e);
                vec![None; texts.len()]
            }
        }
    }

    /// Text a node is embedded from: name, qualified name, description,
    /// parameters, return type, annotations and modifiers joined by ` | `.
    pub fn extract_semantic_content(node: &CodeNode) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !node.name.is_empty() {
            parts.push(node.name.clone());
        }
        if !node.qualified_name.is_empty() && node.qualified_name != node.name {
            parts.push(node.qualified_name.clone());
        }
        if let Some(description) = node.description.as_deref().filter(|d| !d.is_empty()) {
            parts.push(description.to_string());
        }

        let params: Vec<String> = node
            .parameters()
            .iter()
            .map(|p| {
                let mut s = format!("{}: {}", p.name, p.type_name.as_deref().unwrap_or("unknown"));
                if let Some(desc) = &p.description {
                    s.push_str(" - ");
                    s.push_str(desc);
                }
                s
            })
            .collect();
        if !params.is_empty() {
            parts.push(format!("Parameters: {}", params.join(", ")));
        }
        if let Some(ret) = node.return_type() {
            parts.push(format!("Returns: {}", ret));
        }

        let annotations: Vec<String> = node.annotations().into_iter().map(|a| a.name).collect();
        if !annotations.is_empty() {
            parts.push(format!("Annotations: {}", annotations.join(", ")));
        }
        if !node.modifiers.is_empty() {
            parts.push(format!("Modifiers: {}", node.modifiers.join(", ")));
        }
        parts.join(" | ")
    }
}

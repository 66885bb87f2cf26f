use crate::error::VectorError;
use crate::service::EmbeddingService;
use codegraph_core::{
    CodeGraphError, CodeNode, EntityType, GraphStore, NodeUpdate, Result, SemanticEmbedding,
};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SEARCH_RESULTS: usize = 10;
pub const DEFAULT_SIMILAR_NODES: usize = 5;
pub const DEFAULT_MAX_HOPS: usize = 2;
/// Neighbours folded into each hybrid result.
pub const HYBRID_CONTEXT_LIMIT: usize = 5;
const QUERY_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchParams {
    pub query: String,
    pub project_id: String,
    #[serde(default)]
    pub node_types: Option<Vec<EntityType>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

impl SemanticSearchParams {
    pub fn new(project_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchResult {
    pub node: CodeNode,
    pub similarity_score: f32,
    pub matched_content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridSearchOptions {
    pub include_relationships: bool,
    pub max_hops: usize,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            include_relationships: true,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUpdateStats {
    pub updated: usize,
    pub failed: usize,
}

/// Index parameters recorded by `initialize_vector_indexes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub similarity_function: String,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Embedding-backed search over a [`GraphStore`].
///
/// Every operation fails with [`CodeGraphError::EmbeddingDisabled`] when no
/// provider is configured.
pub struct SemanticSearchManager {
    store: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingService>,
    index: RwLock<Option<VectorIndexConfig>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl SemanticSearchManager {
    pub fn new(store: Arc<dyn GraphStore>, embeddings: Arc<EmbeddingService>) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            embeddings,
            index: RwLock::new(None),
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn embedding_service(&self) -> &Arc<EmbeddingService> {
        &self.embeddings
    }

    pub fn index_config(&self) -> Option<VectorIndexConfig> {
        self.index.read().clone()
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.embeddings.is_enabled() {
            Ok(())
        } else {
            Err(VectorError::Disabled.into())
        }
    }

    fn default_threshold(&self) -> f32 {
        self.embeddings.settings().similarity_threshold
    }

    /// Records the dimensionality and similarity function every stored
    /// embedding must match.
    pub fn initialize_vector_indexes(&self) -> Result<VectorIndexConfig> {
        self.ensure_enabled()?;
        let settings = self.embeddings.settings();
        let dimensions = settings
            .dimensions
            .or_else(|| self.embeddings.dimensions())
            .unwrap_or_default();
        let config = VectorIndexConfig {
            dimensions,
            similarity_function: settings.similarity_function.clone(),
        };
        *self.index.write() = Some(config.clone());
        info!(
            "Vector index initialized: {} dimensions, {} similarity",
            config.dimensions, config.similarity_function
        );
        Ok(config)
    }

    pub async fn add_embedding_to_node(
        &self,
        project_id: &str,
        node_id: &str,
        embedding: SemanticEmbedding,
    ) -> Result<CodeNode> {
        let expected = self.index.read().as_ref().map(|index| index.dimensions);
        if let Some(expected) = expected.filter(|d| *d != 0) {
            if expected != embedding.dimensions() {
                return Err(VectorError::DimensionMismatch(expected, embedding.dimensions()).into());
            }
        }
        self.store
            .update_node(project_id, node_id, NodeUpdate::embedding(embedding))
            .await
    }

    async fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        let cached = self.query_cache.lock().get(query).cloned();
        if let Some(vector) = cached {
            debug!("Query embedding cache hit");
            return Ok(vector);
        }
        let embedding = self
            .embeddings
            .generate_embedding(query)
            .await
            .ok_or_else(|| {
                CodeGraphError::EmbeddingProvider(
                    "Failed to generate embedding for query".to_string(),
                )
            })?;
        self.query_cache
            .lock()
            .put(query.to_string(), embedding.vector.clone());
        Ok(embedding.vector)
    }

    /// Ranks `candidates` by cosine similarity to `target`, keeping those at
    /// or above `threshold`.
    fn rank(
        candidates: Vec<CodeNode>,
        target: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Vec<SemanticSearchResult> {
        let mut scored: Vec<(f32, CodeNode)> = candidates
            .into_iter()
            .filter_map(|node| {
                let vector = node.embedding_vector()?;
                if vector.len() != target.len() {
                    debug!("Skipping {} with {}-d embedding", node.id, vector.len());
                    return None;
                }
                let score = cosine_similarity(vector, target);
                (score >= threshold).then_some((score, node))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored
            .into_iter()
            .take(limit)
            .map(|(score, node)| SemanticSearchResult {
                matched_content: EmbeddingService::extract_semantic_content(&node),
                similarity_score: score,
                node,
            })
            .collect()
    }

    pub async fn semantic_search(
        &self,
        params: &SemanticSearchParams,
    ) -> Result<Vec<SemanticSearchResult>> {
        self.ensure_enabled()?;
        let query_vector = self.query_vector(&params.query).await?;
        let candidates = self
            .store
            .nodes_with_embeddings(&params.project_id, params.node_types.as_deref())
            .await?;
        let threshold = params
            .similarity_threshold
            .unwrap_or_else(|| self.default_threshold());
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_RESULTS);
        let results = Self::rank(candidates, &query_vector, threshold, limit);
        debug!(
            "Semantic search '{}' in {}: {} results",
            params.query,
            params.project_id,
            results.len()
        );
        Ok(results)
    }

    /// Semantic search whose results also list nearby graph nodes as
    /// `Related: name (type)`.
    pub async fn hybrid_search(
        &self,
        params: &SemanticSearchParams,
        options: HybridSearchOptions,
    ) -> Result<Vec<SemanticSearchResult>> {
        let results = self.semantic_search(params).await?;
        if !options.include_relationships {
            return Ok(results);
        }

        let max_hops = if options.max_hops == 0 {
            DEFAULT_MAX_HOPS
        } else {
            options.max_hops
        };
        let mut enhanced = Vec::with_capacity(results.len());
        for mut result in results {
            match self
                .store
                .neighbors(&result.node.project_id, &result.node.id, max_hops, HYBRID_CONTEXT_LIMIT)
                .await
            {
                Ok(related) => {
                    let context = related
                        .iter()
                        .map(|n| format!("Related: {} ({})", n.name, n.entity_type));
                    result.matched_content = std::iter::once(result.matched_content.clone())
                        .chain(context)
                        .collect::<Vec<_>>()
                        .join(" | ");
                }
                Err(e) => warn!("Failed to get graph context for node {}: {}", result.node.id, e),
            }
            enhanced.push(result);
        }
        Ok(enhanced)
    }

    /// Nodes closest to `node_id`'s own embedding, excluding itself.
    pub async fn get_similar_nodes(
        &self,
        project_id: &str,
        node_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticSearchResult>> {
        self.ensure_enabled()?;
        let node = self
            .store
            .get_node(project_id, node_id)
            .await?
            .ok_or_else(|| CodeGraphError::node_not_found(project_id, node_id))?;
        let target = node
            .embedding_vector()
            .ok_or_else(|| {
                CodeGraphError::InvalidOperation(format!("Node has no embedding: {}", node_id))
            })?
            .to_vec();

        let candidates: Vec<CodeNode> = self
            .store
            .nodes_with_embeddings(project_id, None)
            .await?
            .into_iter()
            .filter(|n| n.id != node_id)
            .collect();
        Ok(Self::rank(candidates, &target, self.default_threshold(), limit))
    }

    /// Re-embeds every matching node in batches. Failures are counted per
    /// node and never abort the run.
    pub async fn update_embeddings(
        &self,
        project_id: &str,
        node_types: Option<&[EntityType]>,
    ) -> Result<EmbeddingUpdateStats> {
        self.ensure_enabled()?;
        let mut nodes: Vec<CodeNode> = self
            .store
            .get_all_nodes(project_id, usize::MAX)
            .await?
            .into_iter()
            .filter(|n| node_types.map_or(true, |types| types.contains(&n.entity_type)))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let batch_size = self.embeddings.settings().batch_size.max(1);
        let mut stats = EmbeddingUpdateStats::default();
        for batch in nodes.chunks(batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(EmbeddingService::extract_semantic_content)
                .collect();
            let embeddings = self.embeddings.generate_embeddings(&texts).await;
            for (node, embedding) in batch.iter().zip(embeddings) {
                let Some(embedding) = embedding else {
                    stats.failed += 1;
                    continue;
                };
                match self.add_embedding_to_node(&node.project_id, &node.id, embedding).await {
                    Ok(_) => stats.updated += 1,
                    Err(e) => {
                        error!("Failed to update embedding for node {}: {}", node.id, e);
                        stats.failed += 1;
                    }
                }
            }
        }
        info!(
            "Embedding update for {}: {} updated, {} failed",
            project_id, stats.updated, stats.failed
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cosine_basics() {
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_relative_eq!(cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]), -1.0, epsilon = 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}

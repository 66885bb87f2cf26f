use approx::assert_relative_eq;
use async_trait::async_trait;
use codegraph_core::{
    CodeEdge, CodeGraphError, CodeNode, EmbeddingProviderKind, EmbeddingSettings, EntityType,
    GraphStore, RelationshipType, SemanticEmbedding,
};
use codegraph_graph::InMemoryGraphStore;
use codegraph_vector::{
    EmbeddingProvider, EmbeddingService, HybridSearchOptions, SemanticSearchManager,
    SemanticSearchParams, VectorError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PROJECT: &str = "shop";

/// Maps text onto three axes by keyword so similarities are predictable.
#[derive(Default)]
struct KeywordProvider {
    calls: AtomicUsize,
}

impl KeywordProvider {
    fn vector_for(text: &str) -> codegraph_vector::Result<Vec<f32>> {
        let text = text.to_lowercase();
        if text.contains("broken") {
            return Err(VectorError::Provider("refused".to_string()));
        }
        Ok(if text.contains("user") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("order") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        })
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn generate_embedding(&self, text: &str) -> codegraph_vector::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Self::vector_for(text)
    }

    async fn generate_embeddings(
        &self,
        texts: &[String],
    ) -> codegraph_vector::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| Self::vector_for(t)).collect()
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model(&self) -> &str {
        "keyword-test"
    }

    fn provider_name(&self) -> &str {
        "Keyword"
    }
}

fn settings(batch_size: usize) -> EmbeddingSettings {
    EmbeddingSettings {
        provider: EmbeddingProviderKind::Ollama,
        dimensions: Some(3),
        batch_size,
        similarity_threshold: 0.8,
        ..Default::default()
    }
}

fn embedded(node: CodeNode, vector: Vec<f32>) -> CodeNode {
    node.with_embedding(SemanticEmbedding::new(vector, "keyword-test", "1.0"))
}

async fn seeded_store() -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    let nodes = vec![
        embedded(
            CodeNode::new(
                PROJECT,
                EntityType::Class,
                "UserService",
                "app.UserService",
                "UserService.java",
            ),
            vec![1.0, 0.0, 0.0],
        ),
        embedded(
            CodeNode::new(
                PROJECT,
                EntityType::Class,
                "UserRepository",
                "app.UserRepository",
                "UserRepository.java",
            ),
            vec![0.9, 0.1, 0.0],
        ),
        embedded(
            CodeNode::new(
                PROJECT,
                EntityType::Class,
                "OrderService",
                "app.OrderService",
                "OrderService.java",
            ),
            vec![0.0, 1.0, 0.0],
        ),
        CodeNode::new(
            PROJECT,
            EntityType::Method,
            "findUser",
            "app.UserService.findUser",
            "UserService.java",
        ),
    ];
    store.add_nodes(nodes).await.unwrap();
    store
        .add_edge(CodeEdge::new(
            PROJECT,
            RelationshipType::Contains,
            "app.UserService",
            "app.UserService.findUser",
        ))
        .await
        .unwrap();
    store
}

fn manager(
    store: Arc<InMemoryGraphStore>,
    provider: Arc<KeywordProvider>,
    batch_size: usize,
) -> SemanticSearchManager {
    let service = EmbeddingService::with_provider(provider, settings(batch_size));
    SemanticSearchManager::new(store, Arc::new(service))
}

#[tokio::test]
async fn search_filters_by_threshold_and_orders_by_score() {
    let store = seeded_store().await;
    let manager = manager(store, Arc::new(KeywordProvider::default()), 10);

    let results = manager
        .semantic_search(&SemanticSearchParams::new(PROJECT, "find a user"))
        .await
        .unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.node.name.as_str()).collect();
    assert_eq!(names, vec!["UserService", "UserRepository"]);
    assert_relative_eq!(results[0].similarity_score, 1.0, epsilon = 1e-6);
    assert!(results[1].similarity_score >= 0.8 && results[1].similarity_score < 1.0);
    assert!(results[0].matched_content.starts_with("UserService | app.UserService"));

    let mut params = SemanticSearchParams::new(PROJECT, "find a user");
    params.limit = Some(1);
    let limited = manager.semantic_search(&params).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].node.name, "UserService");

    let mut params = SemanticSearchParams::new(PROJECT, "find a user");
    params.node_types = Some(vec![EntityType::Method]);
    assert!(manager.semantic_search(&params).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_queries_hit_the_cache() {
    let store = seeded_store().await;
    let provider = Arc::new(KeywordProvider::default());
    let manager = manager(store, provider.clone(), 10);

    let params = SemanticSearchParams::new(PROJECT, "order totals");
    let first = manager.semantic_search(&params).await.unwrap();
    let second = manager.semantic_search(&params).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].node.name, "OrderService");
    assert_eq!(second.len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hybrid_search_appends_graph_context() {
    let store = seeded_store().await;
    let manager = manager(store, Arc::new(KeywordProvider::default()), 10);

    let mut params = SemanticSearchParams::new(PROJECT, "user");
    params.limit = Some(1);
    let results = manager
        .hybrid_search(&params, HybridSearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]
        .matched_content
        .ends_with(" | Related: findUser (method)"));

    let plain = manager
        .hybrid_search(
            &params,
            HybridSearchOptions {
                include_relationships: false,
                max_hops: 2,
            },
        )
        .await
        .unwrap();
    assert!(!plain[0].matched_content.contains("Related:"));
}

#[tokio::test]
async fn similar_nodes_exclude_the_subject() {
    let store = seeded_store().await;
    let manager = manager(store, Arc::new(KeywordProvider::default()), 10);

    let similar = manager
        .get_similar_nodes(PROJECT, "app.UserService", 5)
        .await
        .unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].node.id, "app.UserRepository");

    let err = manager
        .get_similar_nodes(PROJECT, "app.UserService.findUser", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, CodeGraphError::InvalidOperation(_)));

    let err = manager.get_similar_nodes(PROJECT, "app.Missing", 5).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_embeddings_counts_failures_per_node() {
    let store = Arc::new(InMemoryGraphStore::new());
    store
        .add_nodes(vec![
            CodeNode::new(PROJECT, EntityType::Class, "UserService", "app.UserService", "a.java"),
            CodeNode::new(PROJECT, EntityType::Class, "BrokenThing", "app.BrokenThing", "b.java"),
            CodeNode::new(
                PROJECT,
                EntityType::Method,
                "placeOrder",
                "app.Orders.placeOrder",
                "c.java",
            ),
        ])
        .await
        .unwrap();
    let manager = manager(store.clone(), Arc::new(KeywordProvider::default()), 1);
    manager.initialize_vector_indexes().unwrap();

    let stats = manager.update_embeddings(PROJECT, None).await.unwrap();
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.failed, 1);

    let user = store.get_node(PROJECT, "app.UserService").await.unwrap().unwrap();
    let embedding = user.semantic_embedding.unwrap();
    assert_eq!(embedding.vector, vec![1.0, 0.0, 0.0]);
    assert_eq!(embedding.model, "keyword-test");
    assert!(store
        .get_node(PROJECT, "app.BrokenThing")
        .await
        .unwrap()
        .unwrap()
        .semantic_embedding
        .is_none());

    let only_methods = manager
        .update_embeddings(PROJECT, Some(&[EntityType::Method]))
        .await
        .unwrap();
    assert_eq!(only_methods.updated, 1);
    assert_eq!(only_methods.failed, 0);
}

#[tokio::test]
async fn index_dimensions_are_enforced() {
    let store = seeded_store().await;
    let manager = manager(store, Arc::new(KeywordProvider::default()), 10);

    let config = manager.initialize_vector_indexes().unwrap();
    assert_eq!(config.dimensions, 3);
    assert_eq!(config.similarity_function, "cosine");

    let err = manager
        .add_embedding_to_node(
            PROJECT,
            "app.UserService.findUser",
            SemanticEmbedding::new(vec![1.0, 0.0], "keyword-test", "1.0"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CodeGraphError::Vector(_)));

    let node = manager
        .add_embedding_to_node(
            PROJECT,
            "app.UserService.findUser",
            SemanticEmbedding::new(vec![1.0, 0.0, 0.0], "keyword-test", "1.0"),
        )
        .await
        .unwrap();
    assert_eq!(node.embedding_vector(), Some(&[1.0, 0.0, 0.0][..]));
}

#[tokio::test]
async fn disabled_service_rejects_every_operation() {
    let store = seeded_store().await;
    let manager = SemanticSearchManager::new(store, Arc::new(EmbeddingService::disabled()));
    let params = SemanticSearchParams::new(PROJECT, "user");

    assert!(matches!(
        manager.initialize_vector_indexes(),
        Err(CodeGraphError::EmbeddingDisabled)
    ));
    assert!(matches!(
        manager.semantic_search(&params).await,
        Err(CodeGraphError::EmbeddingDisabled)
    ));
    assert!(matches!(
        manager.hybrid_search(&params, HybridSearchOptions::default()).await,
        Err(CodeGraphError::EmbeddingDisabled)
    ));
    assert!(matches!(
        manager.get_similar_nodes(PROJECT, "app.UserService", 5).await,
        Err(CodeGraphError::EmbeddingDisabled)
    ));
    assert!(matches!(
        manager.update_embeddings(PROJECT, None).await,
        Err(CodeGraphError::EmbeddingDisabled)
    ));
}

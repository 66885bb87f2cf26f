use codegraph_core::{
    CodeEdge, CodeGraphError, CodeNode, EdgeUpdate, EntityType, GraphStore, NodeUpdate, Project,
    RelationshipType, SemanticEmbedding,
};
use codegraph_graph::InMemoryGraphStore;
use tempfile::TempDir;

const P: &str = "demo";

fn node(id: &str, entity_type: EntityType) -> CodeNode {
    let name = CodeNode::simple_name(id).to_string();
    CodeNode::new(P, entity_type, name, id, "src/Demo.java")
}

fn edge(rel: RelationshipType, source: &str, target: &str) -> CodeEdge {
    CodeEdge::new(P, rel, source, target)
}

async fn seeded() -> InMemoryGraphStore {
    let store = InMemoryGraphStore::new();
    store.create_project(Project::new(P, "Demo")).await.unwrap();
    for (id, t) in [
        ("app", EntityType::Package),
        ("app.Base", EntityType::Class),
        ("app.Mid", EntityType::Class),
        ("app.Leaf", EntityType::Class),
        ("app.Leaf.run", EntityType::Method),
        ("app.Mid.save", EntityType::Method),
        ("app.Auditable", EntityType::Interface),
    ] {
        store.add_node(node(id, t)).await.unwrap();
    }
    for e in [
        edge(RelationshipType::Extends, "app.Mid", "app.Base"),
        edge(RelationshipType::Extends, "app.Leaf", "app.Mid"),
        edge(RelationshipType::Contains, "app.Leaf", "app.Leaf.run"),
        edge(RelationshipType::Contains, "app.Mid", "app.Mid.save"),
        edge(RelationshipType::Calls, "app.Leaf.run", "app.Mid.save"),
        edge(RelationshipType::Implements, "app.Leaf", "app.Auditable"),
    ] {
        store.add_edge(e).await.unwrap();
    }
    store
}

#[tokio::test]
async fn writes_merge_on_id() {
    let store = seeded().await;
    let before = store.stats(P).await.unwrap();

    store
        .add_node(node("app.Leaf", EntityType::Class).with_description("leaf class"))
        .await
        .unwrap();
    store
        .add_edge(edge(RelationshipType::Extends, "app.Leaf", "app.Mid"))
        .await
        .unwrap();

    let after = store.stats(P).await.unwrap();
    assert_eq!(before.node_count, after.node_count);
    assert_eq!(before.edge_count, after.edge_count);
    let leaf = store.get_node(P, "app.Leaf").await.unwrap().unwrap();
    assert_eq!(leaf.description.as_deref(), Some("leaf class"));
}

#[tokio::test]
async fn projects_are_isolated() {
    let store = seeded().await;
    assert!(store.get_node("other", "app.Leaf").await.unwrap().is_none());
    assert!(store.find_nodes_by_name("other", "Leaf").await.unwrap().is_empty());
    assert_eq!(store.stats("other").await.unwrap().node_count, 0);
}

#[tokio::test]
async fn edges_require_both_endpoints() {
    let store = seeded().await;
    let err = store
        .add_edge(edge(RelationshipType::Calls, "app.Leaf.run", "lib.Missing.call"))
        .await
        .unwrap_err();
    assert!(matches!(err, CodeGraphError::NodeNotFound { ref id, .. } if id == "lib.Missing.call"));
}

#[tokio::test]
async fn implements_falls_back_to_interface_name() {
    let store = seeded().await;
    store.add_node(node("app.Impl", EntityType::Class)).await.unwrap();

    let stored = store
        .add_edge(edge(RelationshipType::Implements, "app.Impl", "Auditable"))
        .await
        .unwrap();
    assert_eq!(stored.target, "app.Auditable");
    assert_eq!(stored.id, "app.Impl_implements_app.Auditable");
    assert!(stored.attributes.get("fallback_ambiguous").is_none());

    store.add_node(node("other.Auditable", EntityType::Interface)).await.unwrap();
    store.add_node(node("zzz.Impl", EntityType::Class)).await.unwrap();
    let ambiguous = store
        .add_edge(edge(RelationshipType::Implements, "zzz.Impl", "x.Auditable"))
        .await
        .unwrap();
    assert_eq!(ambiguous.target, "app.Auditable");
    assert_eq!(ambiguous.attributes["fallback_ambiguous"], true);
    assert_eq!(
        ambiguous.attributes["fallback_candidates"],
        serde_json::json!(["app.Auditable", "other.Auditable"])
    );

    let same_package = store
        .add_edge(edge(RelationshipType::Implements, "other.Auditable", "Auditable"))
        .await;
    // `other.Auditable` picks the interface in its own package, which is itself.
    assert_eq!(same_package.unwrap().target, "other.Auditable");
}

#[tokio::test]
async fn readding_a_node_keeps_its_embedding() {
    let store = seeded().await;
    store
        .update_node(
            P,
            "app.Leaf",
            NodeUpdate::embedding(SemanticEmbedding::new(vec![0.1, 0.2], "m", "1.0")),
        )
        .await
        .unwrap();
    let mut attrs = serde_json::Map::new();
    attrs.insert("owner".into(), "billing".into());
    store
        .update_node(
            P,
            "app.Leaf",
            NodeUpdate {
                attributes: Some(attrs),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let readded = store
        .add_node(node("app.Leaf", EntityType::Class).with_lines(5, 30))
        .await
        .unwrap();
    assert_eq!(readded.embedding_vector(), Some(&[0.1, 0.2][..]));

    let stored = store.get_node(P, "app.Leaf").await.unwrap().unwrap();
    assert_eq!(stored.embedding_vector(), Some(&[0.1, 0.2][..]));
    assert_eq!(stored.semantic_embedding.as_ref().unwrap().model, "m");
    assert_eq!(stored.attributes["owner"], "billing");
    assert_eq!(stored.start_line, Some(5));
    assert_eq!(
        store
            .nodes_with_embeddings(P, Some(&[EntityType::Class]))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn updates_and_deletes() {
    let store = seeded().await;
    let err = store
        .update_node(P, "app.Leaf", NodeUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CodeGraphError::InvalidOperation(_)));
    let update = NodeUpdate::embedding(SemanticEmbedding::new(vec![1.0], "m", "1.0"));
    let err = store
        .update_node(P, "app.Nope", update)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let updated = store
        .update_edge(
            P,
            "app.Leaf_extends_app.Mid",
            EdgeUpdate::attributes(serde_json::Map::from_iter([("line".to_string(), 7.into())])),
        )
        .await
        .unwrap();
    assert_eq!(updated.source, "app.Leaf");
    assert_eq!(updated.attributes["line"], 7);

    // Re-adding the same relationship merges onto it and keeps its type.
    let readded = store
        .add_edge(edge(RelationshipType::Extends, "app.Leaf", "app.Mid"))
        .await
        .unwrap();
    assert_eq!(readded.id, "app.Leaf_extends_app.Mid");
    assert_eq!(readded.rel_type, RelationshipType::Extends);

    assert!(store.delete_node(P, "app.Mid").await.unwrap());
    assert!(!store.delete_node(P, "app.Mid").await.unwrap());
    assert!(store
        .find_edges_by_target(P, "app.Mid")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .get_edge(P, "app.Mid_extends_app.Base")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.find_edges_by_source(P, "app.Leaf").await.unwrap().len(), 2);
}

#[tokio::test]
async fn queries_and_ordering() {
    let store = seeded().await;
    let classes = store.find_nodes_by_type(P, EntityType::Class).await.unwrap();
    let names: Vec<&str> = classes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Base", "Leaf", "Mid"]);

    let hits = store.search_nodes(P, "LEAF", 0).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(store.search_nodes(P, "app", 3).await.unwrap().len(), 3);

    let all = store.get_all_nodes(P, 0).await.unwrap();
    assert_eq!(all[0].entity_type, EntityType::Package);

    let between = store
        .find_edges_between(P, "app.Leaf.run", "app.Mid.save")
        .await
        .unwrap();
    assert_eq!(between.len(), 1);
    assert_eq!(
        store.find_nodes_by_qualified_name(P, "app.Mid").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn composite_queries() {
    let store = seeded().await;
    let ancestors = store.find_inheritance_hierarchy(P, "app.Leaf").await.unwrap();
    let ids: Vec<&str> = ancestors.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["app.Mid", "app.Base"]);

    let implementors = store
        .find_classes_implementing_interface(P, "Auditable")
        .await
        .unwrap();
    assert_eq!(implementors.len(), 1);
    assert_eq!(implementors[0].id, "app.Leaf");

    let callers = store.find_classes_calling_method(P, "save").await.unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].id, "app.Leaf");

    let near = store.neighbors(P, "app.Leaf.run", 1, 10).await.unwrap();
    let mut ids: Vec<&str> = near.iter().map(|n| n.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["app.Leaf", "app.Mid.save"]);
}

#[tokio::test]
async fn clear_and_delete_project() {
    let store = seeded().await;
    store.clear_project(P).await.unwrap();
    assert_eq!(store.stats(P).await.unwrap().node_count, 0);
    assert!(store.get_project(P).await.unwrap().is_some());

    assert!(store.delete_project(P).await.unwrap());
    assert!(store.get_project(P).await.unwrap().is_none());
    assert!(!store.delete_project(P).await.unwrap());
}

#[tokio::test]
async fn snapshot_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph").join("snapshot.json");
    let store = seeded().await;
    store
        .update_node(
            P,
            "app.Leaf.run",
            NodeUpdate::embedding(SemanticEmbedding::new(vec![0.1, 0.2], "test", "1.0")),
        )
        .await
        .unwrap();
    store.save_snapshot(&path).await.unwrap();

    let restored = InMemoryGraphStore::load_snapshot(&path).await.unwrap();
    assert_eq!(restored.stats(P).await.unwrap(), store.stats(P).await.unwrap());
    let run = restored.get_node(P, "app.Leaf.run").await.unwrap().unwrap();
    assert_eq!(run.embedding_vector(), Some(&[0.1f32, 0.2][..]));
    assert_eq!(restored.find_edges_by_target(P, "app.Mid").await.unwrap().len(), 1);

    let empty = InMemoryGraphStore::load_snapshot(&dir.path().join("missing.json"))
        .await
        .unwrap();
    assert!(empty.list_projects().await.unwrap().is_empty());
}

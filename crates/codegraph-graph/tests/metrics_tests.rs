use approx::assert_relative_eq;
use codegraph_core::{CodeEdge, CodeNode, EntityType, GraphStore, Project, RelationshipType};
use codegraph_graph::{InMemoryGraphStore, IssueType, MetricsEngine, Severity};
use std::sync::Arc;

const P: &str = "metrics";

struct Fixture {
    store: Arc<InMemoryGraphStore>,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(InMemoryGraphStore::new());
        store.create_project(Project::new(P, "Metrics")).await.unwrap();
        Self { store }
    }

    async fn node(&self, id: &str, entity_type: EntityType) {
        let name = CodeNode::simple_name(id).to_string();
        let node = CodeNode::new(P, entity_type, name, id, "src/F.java");
        self.store.add_node(node).await.unwrap();
    }

    async fn abstract_class(&self, id: &str) {
        let name = CodeNode::simple_name(id).to_string();
        let node = CodeNode::new(P, EntityType::Class, name, id, "src/F.java")
            .with_modifiers(["abstract"]);
        self.store.add_node(node).await.unwrap();
    }

    async fn member(&self, class: &str, name: &str, entity_type: EntityType) -> String {
        let id = format!("{}.{}", class, name);
        self.node(&id, entity_type).await;
        self.edge(RelationshipType::Contains, class, &id).await;
        id
    }

    async fn edge(&self, rel: RelationshipType, source: &str, target: &str) {
        self.store
            .add_edge(CodeEdge::new(P, rel, source, target))
            .await
            .unwrap();
    }

    fn engine(&self) -> MetricsEngine {
        MetricsEngine::new(self.store.clone())
    }
}

#[tokio::test]
async fn ck_metrics_for_a_small_hierarchy() {
    let f = Fixture::new().await;
    f.node("app", EntityType::Package).await;
    f.node("app.Base", EntityType::Class).await;
    f.node("app.Service", EntityType::Class).await;
    f.node("app.Child", EntityType::Class).await;
    f.node("app.Repo", EntityType::Class).await;
    f.edge(RelationshipType::Extends, "app.Service", "app.Base").await;
    f.edge(RelationshipType::Extends, "app.Child", "app.Service").await;

    let place = f.member("app.Service", "place", EntityType::Method).await;
    let validate = f.member("app.Service", "validate", EntityType::Method).await;
    let audit = f.member("app.Service", "audit", EntityType::Method).await;
    f.member("app.Service", "repo", EntityType::Field).await;
    let save = f.member("app.Repo", "save", EntityType::Method).await;
    let find = f.member("app.Repo", "find", EntityType::Method).await;

    f.edge(RelationshipType::Calls, &place, &validate).await;
    f.edge(RelationshipType::Calls, &place, &save).await;
    f.edge(RelationshipType::Calls, &audit, &find).await;
    f.edge(RelationshipType::References, "app.Service.repo", "app.Repo").await;

    let m = f.engine().get_class_metrics(P, "app.Service").await.unwrap();
    assert_eq!(m.class_name, "Service");
    assert_eq!(m.wmc, 3);
    assert_eq!(m.dit, 1);
    assert_eq!(m.noc, 1);
    // Repo through calls and the field reference, Base as supertype, Child calls nothing.
    assert_eq!(m.cbo, 2);
    assert_eq!(m.rfc, 3 + 2);
    assert_eq!(m.lcom, 2);

    let child = f.engine().get_class_metrics(P, "app.Child").await.unwrap();
    assert_eq!(child.dit, 2);
    assert_eq!(child.lcom, 0);

    let missing = f.engine().get_class_metrics(P, "app.Nope").await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn isolated_package_sits_on_the_distance_boundary() {
    let f = Fixture::new().await;
    f.node("lonely", EntityType::Package).await;
    f.abstract_class("lonely.Shape").await;
    f.node("lonely.Circle", EntityType::Class).await;
    f.node("lonely.Drawable", EntityType::Interface).await;

    let m = f.engine().get_package_metrics(P, "lonely").await.unwrap();
    assert_eq!(m.ca, 0);
    assert_eq!(m.ce, 0);
    assert_relative_eq!(m.instability, 0.0);
    assert_relative_eq!(m.abstractness, 2.0 / 3.0);
    assert_relative_eq!(m.distance, (m.abstractness - 1.0).abs());
}

#[tokio::test]
async fn package_coupling_and_cycles() {
    let f = Fixture::new().await;
    for pkg in ["app.web", "app.service", "app.repository"] {
        f.node(pkg, EntityType::Package).await;
    }
    f.node("app.web.Controller", EntityType::Class).await;
    f.node("app.service.OrderService", EntityType::Class).await;
    f.node("app.repository.OrderRepo", EntityType::Class).await;
    let handle = f.member("app.web.Controller", "handle", EntityType::Method).await;
    let place = f.member("app.service.OrderService", "place", EntityType::Method).await;
    let save = f.member("app.repository.OrderRepo", "save", EntityType::Method).await;
    let notify = f.member("app.repository.OrderRepo", "notify", EntityType::Method).await;

    f.edge(RelationshipType::Calls, &handle, &place).await;
    f.edge(RelationshipType::Calls, &place, &save).await;
    f.edge(RelationshipType::Calls, &notify, &place).await;

    let engine = f.engine();
    let service = engine.get_package_metrics(P, "app.service").await.unwrap();
    assert_eq!(service.ca, 2);
    assert_eq!(service.ce, 1);
    assert_relative_eq!(service.instability, 1.0 / 3.0);

    let deps = engine.get_package_dependencies(P).await.unwrap();
    assert!(deps["app.service"].contains("app.repository"));
    assert!(deps["app.repository"].contains("app.service"));

    let issues = engine.find_architectural_issues(P).await.unwrap();
    let cycle = issues
        .iter()
        .find(|i| i.issue_type == IssueType::CircularDependency)
        .expect("cycle reported");
    assert_eq!(cycle.severity, Severity::High);
    assert_eq!(cycle.affected_nodes, vec!["app.repository", "app.service"]);
    assert_eq!(
        issues
            .iter()
            .filter(|i| i.issue_type == IssueType::CircularDependency)
            .count(),
        1
    );
    let violation = issues
        .iter()
        .find(|i| i.issue_type == IssueType::LayerViolation)
        .expect("repository depending on service");
    assert_eq!(violation.affected_nodes, vec!["app.repository", "app.service"]);
}

#[tokio::test]
async fn god_class_with_high_coupling_yields_two_issues() {
    let f = Fixture::new().await;
    f.node("big", EntityType::Package).await;
    f.node("big.Manager", EntityType::Class).await;
    let mut methods = Vec::new();
    for i in 0..30 {
        methods.push(f.member("big.Manager", &format!("op{}", i), EntityType::Method).await);
    }
    for i in 0..28 {
        let other = format!("big.Helper{}", i);
        f.node(&other, EntityType::Class).await;
        f.edge(RelationshipType::References, &methods[i], &other).await;
    }

    let issues = f.engine().find_architectural_issues(P).await.unwrap();
    let manager: Vec<_> = issues
        .iter()
        .filter(|i| i.affected_nodes == vec!["big.Manager".to_string()])
        .collect();
    assert_eq!(manager.len(), 2);
    assert_eq!(manager[0].issue_type, IssueType::GodClass);
    assert_eq!(manager[0].severity, Severity::High);
    assert_eq!(manager[1].issue_type, IssueType::HighCoupling);
    assert_eq!(manager[1].severity, Severity::Critical);
    assert_relative_eq!(manager[1].metrics["coupling"], 28.0);

    let summary = f.engine().get_project_summary(P).await.unwrap();
    assert_eq!(summary.total_classes, 29);
    assert_eq!(summary.total_methods, 30);
    assert_eq!(summary.total_packages, 1);
    assert_eq!(summary.issue_count, summary.issues.len());
    // Manager couples to 28 helpers, each helper to Manager.
    assert_relative_eq!(summary.average_cbo, (28.0 + 28.0) / 29.0);
}

// ABOUTME: CK class metrics, package coupling metrics and architectural issue detection
// ABOUTME: Read-only analysis over a project snapshot taken from any GraphStore

use codegraph_core::{
    CodeEdge, CodeGraphError, CodeNode, EntityType, GraphStore, RelationshipType, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const GOD_CLASS_METHODS: usize = 20;
pub const GOD_CLASS_COUPLING: usize = 10;
pub const HIGH_COUPLING: usize = 15;
pub const CRITICAL_COUPLING: usize = 25;
const MAX_CYCLE_LENGTH: usize = 5;

const COUPLING_EDGES: [RelationshipType; 2] =
    [RelationshipType::Calls, RelationshipType::References];
const DEPENDENCY_EDGES: [RelationshipType; 6] = [
    RelationshipType::Calls,
    RelationshipType::References,
    RelationshipType::Extends,
    RelationshipType::Implements,
    RelationshipType::Imports,
    RelationshipType::DependsOn,
];

/// Package name suffixes mapped to a layer; higher layers may depend on lower ones only.
const LAYERS: &[(&[&str], u8)] = &[
    (&["controller", "controllers", "web", "api", "rest", "ui", "view", "views"], 3),
    (&["service", "services", "application", "usecase", "usecases"], 2),
    (&["repository", "repositories", "dao", "persistence", "store"], 1),
    (&["model", "models", "domain", "entity", "entities"], 0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_id: String,
    pub class_name: String,
    /// Weighted methods per class (plain method count).
    pub wmc: usize,
    /// Depth of inheritance tree.
    pub dit: usize,
    /// Number of direct subclasses.
    pub noc: usize,
    /// Coupling between objects.
    pub cbo: usize,
    /// Response for class.
    pub rfc: usize,
    /// Lack of cohesion in methods.
    pub lcom: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetrics {
    pub package_name: String,
    /// Afferent coupling: external classes depending on the package.
    pub ca: usize,
    /// Efferent coupling: external classes the package depends on.
    pub ce: usize,
    pub abstractness: f64,
    pub instability: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    CircularDependency,
    GodClass,
    HighCoupling,
    LayerViolation,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueType::CircularDependency => "circular_dependency",
            IssueType::GodClass => "god_class",
            IssueType::HighCoupling => "high_coupling",
            IssueType::LayerViolation => "layer_violation",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturalIssue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub affected_nodes: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub total_classes: usize,
    pub total_methods: usize,
    pub total_packages: usize,
    pub average_cbo: f64,
    pub average_rfc: f64,
    pub average_dit: f64,
    pub issue_count: usize,
    pub issues: Vec<ArchitecturalIssue>,
}

/// Computes metrics from graph queries; never writes to the store.
#[derive(Clone)]
pub struct MetricsEngine {
    store: Arc<dyn GraphStore>,
}

impl MetricsEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    async fn view(&self, project_id: &str) -> Result<GraphView> {
        let nodes = self.store.get_all_nodes(project_id, usize::MAX).await?;
        let edges = self.store.get_all_edges(project_id, usize::MAX).await?;
        Ok(GraphView::new(nodes, edges))
    }

    #[instrument(skip(self))]
    pub async fn get_class_metrics(
        &self,
        project_id: &str,
        class_id: &str,
    ) -> Result<ClassMetrics> {
        let view = self.view(project_id).await?;
        match view.nodes.get(class_id) {
            Some(node) if node.entity_type.is_type_declaration() => Ok(view.class_metrics(node)),
            _ => Err(CodeGraphError::node_not_found(project_id, class_id)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_package_metrics(
        &self,
        project_id: &str,
        package: &str,
    ) -> Result<PackageMetrics> {
        let view = self.view(project_id).await?;
        if !view.namespaces.contains(package)
            && !view.nodes.keys().any(|id| in_package(id, package))
        {
            return Err(CodeGraphError::node_not_found(project_id, package));
        }
        Ok(view.package_metrics(package))
    }

    /// Package-level dependency graph derived from cross-package edges.
    pub async fn get_package_dependencies(
        &self,
        project_id: &str,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        Ok(self.view(project_id).await?.package_dependencies())
    }

    #[instrument(skip(self))]
    pub async fn find_architectural_issues(
        &self,
        project_id: &str,
    ) -> Result<Vec<ArchitecturalIssue>> {
        let view = self.view(project_id).await?;
        let issues = view.issues();
        debug!("Found {} architectural issues in {}", issues.len(), project_id);
        Ok(issues)
    }

    #[instrument(skip(self))]
    pub async fn get_project_summary(&self, project_id: &str) -> Result<ProjectSummary> {
        let view = self.view(project_id).await?;
        let classes = view.nodes_of(EntityType::Class);
        let metrics: Vec<ClassMetrics> = classes.iter().map(|c| view.class_metrics(c)).collect();
        let average = |f: fn(&ClassMetrics) -> usize| {
            if metrics.is_empty() {
                0.0
            } else {
                metrics.iter().map(|m| f(m) as f64).sum::<f64>() / metrics.len() as f64
            }
        };
        let issues = view.issues();
        Ok(ProjectSummary {
            total_classes: classes.len(),
            total_methods: view.nodes_of(EntityType::Method).len(),
            total_packages: view.namespaces.len(),
            average_cbo: average(|m| m.cbo),
            average_rfc: average(|m| m.rfc),
            average_dit: average(|m| m.dit),
            issue_count: issues.len(),
            issues,
        })
    }
}

fn in_package(id: &str, package: &str) -> bool {
    id.len() > package.len()
        && id.starts_with(package)
        && matches!(id.as_bytes()[package.len()], b'.' | b'/')
}

fn layer_of(package: &str) -> Option<u8> {
    let last = package.rsplit(['.', '/']).next()?.to_lowercase();
    LAYERS
        .iter()
        .find(|(names, _)| names.contains(&last.as_str()))
        .map(|(_, rank)| *rank)
}

struct GraphView {
    nodes: HashMap<String, CodeNode>,
    edges: Vec<CodeEdge>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
    /// Java packages plus Python/TypeScript modules.
    namespaces: BTreeSet<String>,
}

impl GraphView {
    fn new(nodes: Vec<CodeNode>, edges: Vec<CodeEdge>) -> Self {
        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source.clone()).or_default().push(i);
            incoming.entry(edge.target.clone()).or_default().push(i);
        }
        let namespaces = nodes
            .iter()
            .filter(|n| match n.entity_type {
                EntityType::Package => true,
                EntityType::Module => !n.id.contains('/'),
                _ => false,
            })
            .map(|n| n.id.clone())
            .collect();
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            edges,
            outgoing,
            incoming,
            namespaces,
        }
    }

    fn nodes_of(&self, entity_type: EntityType) -> Vec<&CodeNode> {
        let mut nodes: Vec<&CodeNode> = self
            .nodes
            .values()
            .filter(|n| n.entity_type == entity_type)
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    fn out_edges(&self, id: &str, rel: RelationshipType) -> impl Iterator<Item = &CodeEdge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(move |e| e.rel_type == rel)
    }

    fn in_edges(&self, id: &str, rel: RelationshipType) -> impl Iterator<Item = &CodeEdge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(move |e| e.rel_type == rel)
    }

    fn members(&self, class_id: &str, entity_type: EntityType) -> BTreeSet<&str> {
        self.out_edges(class_id, RelationshipType::Contains)
            .filter(|e| {
                self.nodes
                    .get(&e.target)
                    .is_some_and(|n| n.entity_type == entity_type)
            })
            .map(|e| e.target.as_str())
            .collect()
    }

    fn is_type(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.entity_type.is_type_declaration())
    }

    /// The type declaration an id belongs to: itself, its container, or the
    /// type named by its qualified-name prefix.
    fn owner_class(&self, id: &str) -> Option<String> {
        if self.is_type(id) {
            return Some(id.to_string());
        }
        if let Some(edge) = self
            .in_edges(id, RelationshipType::Contains)
            .find(|e| self.is_type(&e.source))
        {
            return Some(edge.source.clone());
        }
        let (prefix, _) = id.rsplit_once('.')?;
        self.is_type(prefix).then(|| prefix.to_string())
    }

    fn dit(&self, class_id: &str) -> usize {
        fn depth(view: &GraphView, id: &str, visiting: &mut HashSet<String>) -> usize {
            if !visiting.insert(id.to_string()) {
                return 0;
            }
            let deepest = view
                .out_edges(id, RelationshipType::Extends)
                .map(|e| 1 + depth(view, &e.target, visiting))
                .max()
                .unwrap_or(0);
            visiting.remove(id);
            deepest
        }
        depth(self, class_id, &mut HashSet::new())
    }

    fn cbo(&self, class_id: &str) -> usize {
        let mut units: Vec<&str> = vec![class_id];
        units.extend(self.members(class_id, EntityType::Method));
        units.extend(self.members(class_id, EntityType::Field));

        let mut coupled: HashSet<String> = HashSet::new();
        for unit in units {
            for rel in COUPLING_EDGES {
                let others = self
                    .out_edges(unit, rel)
                    .map(|e| e.target.as_str())
                    .chain(self.in_edges(unit, rel).map(|e| e.source.as_str()));
                for other in others {
                    if let Some(owner) = self.owner_class(other) {
                        if owner != class_id {
                            coupled.insert(owner);
                        }
                    }
                }
            }
        }
        for rel in [RelationshipType::Extends, RelationshipType::Implements] {
            for edge in self.out_edges(class_id, rel) {
                if edge.target != class_id {
                    coupled.insert(edge.target.clone());
                }
            }
        }
        coupled.len()
    }

    fn class_metrics(&self, class: &CodeNode) -> ClassMetrics {
        let methods = self.members(&class.id, EntityType::Method);
        let fields = self.members(&class.id, EntityType::Field);
        let called: BTreeSet<&str> = methods
            .iter()
            .flat_map(|m| self.out_edges(m, RelationshipType::Calls))
            .map(|e| e.target.as_str())
            .filter(|target| !methods.contains(target))
            .collect();
        let noc: BTreeSet<&str> = self
            .in_edges(&class.id, RelationshipType::Extends)
            .map(|e| e.source.as_str())
            .collect();
        let lcom = if !methods.is_empty() && !fields.is_empty() {
            methods.len().saturating_sub(fields.len())
        } else {
            0
        };
        ClassMetrics {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            wmc: methods.len(),
            dit: self.dit(&class.id),
            noc: noc.len(),
            cbo: self.cbo(&class.id),
            rfc: methods.len() + called.len(),
            lcom,
        }
    }

    fn unit(&self, id: &str) -> String {
        self.owner_class(id).unwrap_or_else(|| id.to_string())
    }

    fn package_metrics(&self, package: &str) -> PackageMetrics {
        let mut afferent: HashSet<String> = HashSet::new();
        let mut efferent: HashSet<String> = HashSet::new();
        for edge in self.edges.iter().filter(|e| DEPENDENCY_EDGES.contains(&e.rel_type)) {
            let source_inside = in_package(&edge.source, package);
            let target_inside = in_package(&edge.target, package);
            if target_inside && !source_inside {
                afferent.insert(self.unit(&edge.source));
            } else if source_inside && !target_inside {
                efferent.insert(self.unit(&edge.target));
            }
        }

        let types: Vec<&CodeNode> = self
            .nodes
            .values()
            .filter(|n| matches!(n.entity_type, EntityType::Class | EntityType::Interface))
            .filter(|n| in_package(&n.id, package))
            .collect();
        let abstractness = if types.is_empty() {
            0.0
        } else {
            types.iter().filter(|n| n.is_abstract()).count() as f64 / types.len() as f64
        };

        let (ca, ce) = (afferent.len(), efferent.len());
        let instability = if ca + ce == 0 {
            0.0
        } else {
            ce as f64 / (ca + ce) as f64
        };
        PackageMetrics {
            package_name: package.to_string(),
            ca,
            ce,
            abstractness,
            instability,
            distance: (abstractness + instability - 1.0).abs(),
        }
    }

    /// Innermost namespace containing `id`.
    fn package_of(&self, id: &str) -> Option<&str> {
        if let Some((package, _)) = id.split_once('/') {
            return self.namespaces.get(package).map(String::as_str);
        }
        self.namespaces
            .iter()
            .filter(|ns| id == ns.as_str() || in_package(id, ns))
            .max_by_key(|ns| ns.len())
            .map(String::as_str)
    }

    fn package_dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for edge in self.edges.iter().filter(|e| DEPENDENCY_EDGES.contains(&e.rel_type)) {
            let (Some(from), Some(to)) =
                (self.package_of(&edge.source), self.package_of(&edge.target))
            else {
                continue;
            };
            if from != to {
                deps.entry(from.to_string()).or_default().insert(to.to_string());
            }
        }
        deps
    }

    fn issues(&self) -> Vec<ArchitecturalIssue> {
        let deps = self.package_dependencies();
        let mut issues = Vec::new();

        for cycle in find_cycles(&deps, MAX_CYCLE_LENGTH) {
            let mut path = cycle.clone();
            path.push(cycle[0].clone());
            issues.push(ArchitecturalIssue {
                issue_type: IssueType::CircularDependency,
                severity: Severity::High,
                description: format!("Circular dependency between packages: {}", path.join(" -> ")),
                metrics: BTreeMap::from([("cycle_length".to_string(), cycle.len() as f64)]),
                affected_nodes: cycle,
            });
        }

        for (from, targets) in &deps {
            let Some(from_layer) = layer_of(from) else { continue };
            for to in targets {
                match layer_of(to) {
                    Some(to_layer) if to_layer > from_layer => issues.push(ArchitecturalIssue {
                        issue_type: IssueType::LayerViolation,
                        severity: Severity::Medium,
                        description: format!(
                            "Layer violation: {} depends on higher layer {}",
                            from, to
                        ),
                        affected_nodes: vec![from.clone(), to.clone()],
                        metrics: BTreeMap::new(),
                    }),
                    _ => {}
                }
            }
        }

        let classes = self.nodes_of(EntityType::Class);
        let measured: Vec<(&CodeNode, usize, usize)> = classes
            .iter()
            .map(|c| (*c, self.members(&c.id, EntityType::Method).len(), self.cbo(&c.id)))
            .collect();

        for (class, methods, cbo) in &measured {
            if *methods > GOD_CLASS_METHODS && *cbo > GOD_CLASS_COUPLING {
                issues.push(ArchitecturalIssue {
                    issue_type: IssueType::GodClass,
                    severity: Severity::High,
                    description: format!(
                        "God class detected: {} ({} methods, {} couplings)",
                        class.name, methods, cbo
                    ),
                    affected_nodes: vec![class.id.clone()],
                    metrics: BTreeMap::from([
                        ("method_count".to_string(), *methods as f64),
                        ("coupling".to_string(), *cbo as f64),
                    ]),
                });
            }
        }

        let mut coupled: Vec<&(&CodeNode, usize, usize)> =
            measured.iter().filter(|(_, _, cbo)| *cbo > HIGH_COUPLING).collect();
        coupled.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.id.cmp(&b.0.id)));
        for (class, _, cbo) in coupled {
            issues.push(ArchitecturalIssue {
                issue_type: IssueType::HighCoupling,
                severity: if *cbo > CRITICAL_COUPLING {
                    Severity::Critical
                } else {
                    Severity::High
                },
                description: format!("Highly coupled class: {} ({} couplings)", class.name, cbo),
                affected_nodes: vec![class.id.clone()],
                metrics: BTreeMap::from([("coupling".to_string(), *cbo as f64)]),
            });
        }
        issues
    }
}

/// Simple cycles of length 2..=`max_len`, each reported once starting from
/// its smallest package name.
pub fn find_cycles(deps: &BTreeMap<String, BTreeSet<String>>, max_len: usize) -> Vec<Vec<String>> {
    fn walk(
        deps: &BTreeMap<String, BTreeSet<String>>,
        start: &str,
        path: &mut Vec<String>,
        max_len: usize,
        found: &mut Vec<Vec<String>>,
    ) {
        let Some(current) = path.last().cloned() else { return };
        for next in deps.get(&current).into_iter().flatten() {
            if next == start {
                if path.len() >= 2 {
                    found.push(path.clone());
                }
                continue;
            }
            if next.as_str() < start || path.contains(next) || path.len() >= max_len {
                continue;
            }
            path.push(next.clone());
            walk(deps, start, path, max_len, found);
            path.pop();
        }
    }

    let mut found = Vec::new();
    for start in deps.keys() {
        let mut path = vec![start.clone()];
        walk(deps, start, &mut path, max_len, &mut found);
    }
    found
}

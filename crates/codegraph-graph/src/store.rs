// ABOUTME: In-memory, project-scoped property graph implementing GraphStore
// ABOUTME: Merge-on-id writes, adjacency indexes, IMPLEMENTS fallback and JSON snapshots

use async_trait::async_trait;
use codegraph_core::{
    relationship_id, CodeEdge, CodeGraphError, CodeNode, EdgeUpdate, EntityType, GraphStats,
    GraphStore, NodeUpdate, Project, RelationshipType, Result, DEFAULT_LIST_LIMIT,
    DEFAULT_SEARCH_LIMIT,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug)]
struct ProjectGraph {
    project: Project,
    nodes: HashMap<String, CodeNode>,
    edges: HashMap<String, CodeEdge>,
    outgoing: HashMap<String, HashSet<String>>,
    incoming: HashMap<String, HashSet<String>>,
}

impl ProjectGraph {
    fn new(project: Project) -> Self {
        Self {
            project,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
    }

    fn insert_edge(&mut self, edge: CodeEdge) {
        if let Some(previous) = self.edges.get(&edge.id) {
            let (source, target) = (previous.source.clone(), previous.target.clone());
            self.unindex(&edge.id, &source, &target);
        }
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.id.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
    }

    fn remove_edge(&mut self, id: &str) -> bool {
        match self.edges.remove(id) {
            Some(edge) => {
                self.unindex(id, &edge.source, &edge.target);
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, id: &str, source: &str, target: &str) {
        if let Some(ids) = self.outgoing.get_mut(source) {
            ids.remove(id);
        }
        if let Some(ids) = self.incoming.get_mut(target) {
            ids.remove(id);
        }
    }

    fn edges_from(&self, source: &str) -> Vec<CodeEdge> {
        self.collect_edges(self.outgoing.get(source))
    }

    fn edges_to(&self, target: &str) -> Vec<CodeEdge> {
        self.collect_edges(self.incoming.get(target))
    }

    fn collect_edges(&self, ids: Option<&HashSet<String>>) -> Vec<CodeEdge> {
        let mut edges: Vec<CodeEdge> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).cloned())
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    /// Interface chosen when an `IMPLEMENTS` target is not a node id.
    fn implements_fallback(&self, edge: &CodeEdge) -> Option<(String, Vec<String>)> {
        let simple = CodeNode::simple_name(&edge.target);
        let mut candidates: Vec<&CodeNode> = self
            .nodes
            .values()
            .filter(|n| n.entity_type == EntityType::Interface && n.name == simple)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        let source_package = namespace_of(&edge.source);
        let chosen = candidates
            .iter()
            .find(|c| namespace_of(&c.id) == source_package)
            .unwrap_or(&candidates[0])
            .id
            .clone();
        Some((chosen, candidates.iter().map(|c| c.id.clone()).collect()))
    }
}

fn namespace_of(id: &str) -> &str {
    id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
}

fn effective_limit(limit: usize, default: usize) -> usize {
    if limit == 0 {
        default
    } else {
        limit
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    projects: Vec<ProjectSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectSnapshot {
    project: Project,
    nodes: Vec<CodeNode>,
    edges: Vec<CodeEdge>,
}

/// Thread-safe in-memory graph store.
///
/// Projects are isolated behind their own lock; no lock is held across an
/// `.await`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGraphStore {
    projects: Arc<DashMap<String, Arc<RwLock<ProjectGraph>>>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(&self, project_id: &str) -> Option<Arc<RwLock<ProjectGraph>>> {
        self.projects.get(project_id).map(|p| p.value().clone())
    }

    /// Writes implicitly create a bare project record.
    fn project_or_create(&self, project_id: &str) -> Arc<RwLock<ProjectGraph>> {
        self.projects
            .entry(project_id.to_string())
            .or_insert_with(|| {
                debug!("Creating implicit project record: {}", project_id);
                Arc::new(RwLock::new(ProjectGraph::new(Project::new(project_id, project_id))))
            })
            .value()
            .clone()
    }

    fn read<T>(&self, project_id: &str, default: T, f: impl FnOnce(&ProjectGraph) -> T) -> T {
        match self.project(project_id) {
            Some(graph) => f(&graph.read()),
            None => default,
        }
    }

    /// Writes every project to `path` as pretty JSON, replacing it atomically.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let mut projects: Vec<ProjectSnapshot> = self
            .projects
            .iter()
            .map(|entry| {
                let graph = entry.value().read();
                let mut nodes: Vec<CodeNode> = graph.nodes.values().cloned().collect();
                nodes.sort_by(|a, b| a.id.cmp(&b.id));
                let mut edges: Vec<CodeEdge> = graph.edges.values().cloned().collect();
                edges.sort_by(|a, b| a.id.cmp(&b.id));
                ProjectSnapshot {
                    project: graph.project.clone(),
                    nodes,
                    edges,
                }
            })
            .collect();
        projects.sort_by(|a, b| a.project.id.cmp(&b.project.id));

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            projects,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!("Saved graph snapshot to {:?}", path);
        Ok(())
    }

    /// Loads a snapshot written by [`save_snapshot`](Self::save_snapshot).
    /// A missing file yields an empty store.
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let store = Self::new();
        if !tokio::fs::try_exists(path).await? {
            debug!("No graph snapshot at {:?}", path);
            return Ok(store);
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CodeGraphError::InvalidOperation(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        for entry in snapshot.projects {
            let mut graph = ProjectGraph::new(entry.project);
            for node in entry.nodes {
                graph.nodes.insert(node.id.clone(), node);
            }
            for edge in entry.edges {
                graph.insert_edge(edge);
            }
            store
                .projects
                .insert(graph.project.id.clone(), Arc::new(RwLock::new(graph)));
        }
        info!("Loaded graph snapshot from {:?}", path);
        Ok(store)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_project(&self, project: Project) -> Result<Project> {
        let entry = self.projects.entry(project.id.clone());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let mut graph = existing.get().write();
                graph.project = Project {
                    created_at: graph.project.created_at,
                    updated_at: chrono::Utc::now(),
                    ..project
                };
                Ok(graph.project.clone())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!("Created project {}", project.id);
                slot.insert(Arc::new(RwLock::new(ProjectGraph::new(project.clone()))));
                Ok(project)
            }
        }
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.read(project_id, None, |g| Some(g.project.clone())))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .map(|p| p.value().read().project.clone())
            .collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool> {
        Ok(self.projects.remove(project_id).is_some())
    }

    async fn clear_project(&self, project_id: &str) -> Result<()> {
        let graph = self
            .project(project_id)
            .ok_or_else(|| CodeGraphError::ProjectNotFound(project_id.to_string()))?;
        graph.write().clear();
        Ok(())
    }

    async fn add_node(&self, node: CodeNode) -> Result<CodeNode> {
        let graph = self.project_or_create(&node.project_id);
        let mut graph = graph.write();
        let node = match graph.nodes.get(&node.id) {
            Some(stored) => node.merged_over(stored),
            None => node,
        };
        graph.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn update_node(
        &self,
        project_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> Result<CodeNode> {
        if update.is_empty() {
            return Err(CodeGraphError::InvalidOperation(
                "node update sets no fields".to_string(),
            ));
        }
        let graph = self
            .project(project_id)
            .ok_or_else(|| CodeGraphError::node_not_found(project_id, id))?;
        let mut graph = graph.write();
        let node = graph
            .nodes
            .get_mut(id)
            .ok_or_else(|| CodeGraphError::node_not_found(project_id, id))?;
        update.apply(node);
        Ok(node.clone())
    }

    async fn get_node(&self, project_id: &str, id: &str) -> Result<Option<CodeNode>> {
        Ok(self.read(project_id, None, |g| g.nodes.get(id).cloned()))
    }

    async fn delete_node(&self, project_id: &str, id: &str) -> Result<bool> {
        let Some(graph) = self.project(project_id) else {
            return Ok(false);
        };
        let mut graph = graph.write();
        if graph.nodes.remove(id).is_none() {
            return Ok(false);
        }
        let attached: Vec<String> = graph
            .outgoing
            .remove(id)
            .into_iter()
            .flatten()
            .chain(graph.incoming.remove(id).into_iter().flatten())
            .collect();
        for edge_id in attached {
            graph.remove_edge(&edge_id);
        }
        Ok(true)
    }

    async fn find_nodes_by_type(
        &self,
        project_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<CodeNode>> {
        let mut nodes = self.read(project_id, Vec::new(), |g| {
            g.nodes
                .values()
                .filter(|n| n.entity_type == entity_type)
                .cloned()
                .collect::<Vec<_>>()
        });
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn find_nodes_by_name(&self, project_id: &str, name: &str) -> Result<Vec<CodeNode>> {
        let mut nodes = self.read(project_id, Vec::new(), |g| {
            g.nodes
                .values()
                .filter(|n| n.name.contains(name))
                .cloned()
                .collect::<Vec<_>>()
        });
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn find_nodes_by_qualified_name(
        &self,
        project_id: &str,
        qualified_name: &str,
    ) -> Result<Vec<CodeNode>> {
        let mut nodes = self.read(project_id, Vec::new(), |g| {
            g.nodes
                .values()
                .filter(|n| n.qualified_name == qualified_name)
                .cloned()
                .collect::<Vec<_>>()
        });
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn search_nodes(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CodeNode>> {
        let needle = query.to_lowercase();
        let mut nodes = self.read(project_id, Vec::new(), |g| {
            g.nodes
                .values()
                .filter(|n| {
                    n.name.to_lowercase().contains(&needle)
                        || n.qualified_name.to_lowercase().contains(&needle)
                        || n.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect::<Vec<_>>()
        });
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        nodes.truncate(effective_limit(limit, DEFAULT_SEARCH_LIMIT));
        Ok(nodes)
    }

    async fn get_all_nodes(&self, project_id: &str, limit: usize) -> Result<Vec<CodeNode>> {
        let mut nodes = self.read(project_id, Vec::new(), |g| {
            g.nodes.values().cloned().collect::<Vec<_>>()
        });
        nodes.sort_by(|a, b| {
            a.entity_type
                .cmp(&b.entity_type)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        nodes.truncate(effective_limit(limit, DEFAULT_LIST_LIMIT));
        Ok(nodes)
    }

    async fn add_edge(&self, edge: CodeEdge) -> Result<CodeEdge> {
        let graph = self
            .project(&edge.project_id)
            .ok_or_else(|| CodeGraphError::node_not_found(&edge.project_id, &edge.source))?;
        let mut graph = graph.write();

        if !graph.nodes.contains_key(&edge.source) {
            return Err(CodeGraphError::node_not_found(&edge.project_id, &edge.source));
        }
        if graph.nodes.contains_key(&edge.target) {
            graph.insert_edge(edge.clone());
            return Ok(edge);
        }
        if edge.rel_type != RelationshipType::Implements {
            return Err(CodeGraphError::node_not_found(&edge.project_id, &edge.target));
        }

        let (target, candidates) = graph
            .implements_fallback(&edge)
            .ok_or_else(|| CodeGraphError::node_not_found(&edge.project_id, &edge.target))?;
        let mut resolved = CodeEdge {
            id: relationship_id(&edge.source, edge.rel_type, &target),
            target: target.clone(),
            ..edge.clone()
        };
        resolved
            .attributes
            .insert("fallback_from".into(), edge.target.clone().into());
        if candidates.len() > 1 {
            warn!(
                "Ambiguous IMPLEMENTS fallback for {} -> {}: picked {} from {:?}",
                edge.source, edge.target, target, candidates
            );
            resolved
                .attributes
                .insert("fallback_ambiguous".into(), true.into());
            resolved
                .attributes
                .insert("fallback_candidates".into(), candidates.into());
        } else {
            debug!(
                "IMPLEMENTS fallback {} -> {} resolved to {}",
                edge.source, edge.target, target
            );
        }
        graph.insert_edge(resolved.clone());
        Ok(resolved)
    }

    async fn update_edge(
        &self,
        project_id: &str,
        id: &str,
        update: EdgeUpdate,
    ) -> Result<CodeEdge> {
        if update.is_empty() {
            return Err(CodeGraphError::InvalidOperation(
                "edge update sets no fields".to_string(),
            ));
        }
        let graph = self
            .project(project_id)
            .ok_or_else(|| CodeGraphError::edge_not_found(project_id, id))?;
        let mut graph = graph.write();
        let edge = graph
            .edges
            .get_mut(id)
            .ok_or_else(|| CodeGraphError::edge_not_found(project_id, id))?;
        update.apply(edge);
        Ok(edge.clone())
    }

    async fn get_edge(&self, project_id: &str, id: &str) -> Result<Option<CodeEdge>> {
        Ok(self.read(project_id, None, |g| g.edges.get(id).cloned()))
    }

    async fn delete_edge(&self, project_id: &str, id: &str) -> Result<bool> {
        Ok(match self.project(project_id) {
            Some(graph) => graph.write().remove_edge(id),
            None => false,
        })
    }

    async fn find_edges_by_type(
        &self,
        project_id: &str,
        rel_type: RelationshipType,
    ) -> Result<Vec<CodeEdge>> {
        let mut edges = self.read(project_id, Vec::new(), |g| {
            g.edges
                .values()
                .filter(|e| e.rel_type == rel_type)
                .cloned()
                .collect::<Vec<_>>()
        });
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    async fn find_edges_by_source(&self, project_id: &str, source: &str) -> Result<Vec<CodeEdge>> {
        Ok(self.read(project_id, Vec::new(), |g| g.edges_from(source)))
    }

    async fn find_edges_by_target(&self, project_id: &str, target: &str) -> Result<Vec<CodeEdge>> {
        Ok(self.read(project_id, Vec::new(), |g| g.edges_to(target)))
    }

    async fn find_edges_between(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Vec<CodeEdge>> {
        Ok(self.read(project_id, Vec::new(), |g| {
            g.edges_from(source)
                .into_iter()
                .filter(|e| e.target == target)
                .collect()
        }))
    }

    async fn get_all_edges(&self, project_id: &str, limit: usize) -> Result<Vec<CodeEdge>> {
        let mut edges = self.read(project_id, Vec::new(), |g| {
            g.edges.values().cloned().collect::<Vec<_>>()
        });
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges.truncate(effective_limit(limit, DEFAULT_LIST_LIMIT));
        Ok(edges)
    }

    async fn stats(&self, project_id: &str) -> Result<GraphStats> {
        Ok(self.read(project_id, GraphStats::default(), |g| {
            let mut stats = GraphStats {
                node_count: g.nodes.len(),
                edge_count: g.edges.len(),
                ..Default::default()
            };
            for node in g.nodes.values() {
                *stats
                    .nodes_by_type
                    .entry(node.entity_type.as_str().to_string())
                    .or_default() += 1;
            }
            for edge in g.edges.values() {
                *stats
                    .edges_by_type
                    .entry(edge.rel_type.as_str().to_string())
                    .or_default() += 1;
            }
            stats
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, t: EntityType) -> CodeNode {
        let name = CodeNode::simple_name(id).to_string();
        CodeNode::new("p", t, name, id, "F.java")
    }

    #[tokio::test]
    async fn edge_rewrites_keep_indexes_consistent() {
        let store = InMemoryGraphStore::new();
        store.add_node(node("a.A", EntityType::Class)).await.unwrap();
        store.add_node(node("a.B", EntityType::Class)).await.unwrap();
        let edge = CodeEdge::new("p", RelationshipType::Calls, "a.A", "a.B");
        store.add_edge(edge.clone()).await.unwrap();
        store.add_edge(edge.with_attribute("line", 3)).await.unwrap();

        let out = store.find_edges_by_source("p", "a.A").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].attributes["line"], 3);
        assert_eq!(store.find_edges_by_target("p", "a.B").await.unwrap().len(), 1);
    }

    #[test]
    fn namespace_strips_last_segment() {
        assert_eq!(namespace_of("com.acme.Foo"), "com.acme");
        assert_eq!(namespace_of("Foo"), "");
    }
}

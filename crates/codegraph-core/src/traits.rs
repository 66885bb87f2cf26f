use crate::{
    CodeEdge, CodeGraphError, CodeNode, EdgeUpdate, EntityType, NodeUpdate, Project,
    RelationshipType, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Cap applied to substring search when callers pass no explicit limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;
/// Cap applied to whole-project listings.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Outcome of a batched write: successes are counted, failures keep their id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteResult {
    pub written: usize,
    pub failed: Vec<(String, String)>,
}

impl BatchWriteResult {
    pub fn merge(&mut self, other: BatchWriteResult) {
        self.written += other.written;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: HashMap<String, usize>,
    pub edges_by_type: HashMap<String, usize>,
}

/// Project-scoped property-graph store.
///
/// Every write merges on `(project_id, id)`; re-adding an existing node or edge
/// updates it in place rather than failing. A re-added node without an
/// embedding keeps the stored one. Reads never cross project boundaries.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_project(&self, project: Project) -> Result<Project>;
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    /// Removes the project record together with every node and edge it owns.
    async fn delete_project(&self, project_id: &str) -> Result<bool>;
    /// Drops nodes and edges but keeps the project record.
    async fn clear_project(&self, project_id: &str) -> Result<()>;

    async fn add_node(&self, node: CodeNode) -> Result<CodeNode>;
    async fn update_node(&self, project_id: &str, id: &str, update: NodeUpdate)
        -> Result<CodeNode>;
    async fn get_node(&self, project_id: &str, id: &str) -> Result<Option<CodeNode>>;
    /// Detaches and removes the node; returns whether anything was removed.
    async fn delete_node(&self, project_id: &str, id: &str) -> Result<bool>;
    async fn find_nodes_by_type(
        &self,
        project_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<CodeNode>>;
    async fn find_nodes_by_name(&self, project_id: &str, name: &str) -> Result<Vec<CodeNode>>;
    async fn find_nodes_by_qualified_name(
        &self,
        project_id: &str,
        qualified_name: &str,
    ) -> Result<Vec<CodeNode>>;
    async fn search_nodes(&self, project_id: &str, query: &str, limit: usize)
        -> Result<Vec<CodeNode>>;
    async fn get_all_nodes(&self, project_id: &str, limit: usize) -> Result<Vec<CodeNode>>;

    /// Fails with `NodeNotFound` when either endpoint is missing, except for
    /// `IMPLEMENTS` edges which retry against interfaces sharing the target's
    /// unqualified name.
    async fn add_edge(&self, edge: CodeEdge) -> Result<CodeEdge>;
    async fn update_edge(&self, project_id: &str, id: &str, update: EdgeUpdate)
        -> Result<CodeEdge>;
    async fn get_edge(&self, project_id: &str, id: &str) -> Result<Option<CodeEdge>>;
    async fn delete_edge(&self, project_id: &str, id: &str) -> Result<bool>;
    async fn find_edges_by_type(
        &self,
        project_id: &str,
        rel_type: RelationshipType,
    ) -> Result<Vec<CodeEdge>>;
    async fn find_edges_by_source(&self, project_id: &str, source: &str) -> Result<Vec<CodeEdge>>;
    async fn find_edges_by_target(&self, project_id: &str, target: &str) -> Result<Vec<CodeEdge>>;
    async fn find_edges_between(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Vec<CodeEdge>>;
    async fn get_all_edges(&self, project_id: &str, limit: usize) -> Result<Vec<CodeEdge>>;

    async fn stats(&self, project_id: &str) -> Result<GraphStats>;

    async fn add_nodes(&self, nodes: Vec<CodeNode>) -> Result<BatchWriteResult> {
        let mut result = BatchWriteResult::default();
        for node in nodes {
            let id = node.id.clone();
            match self.add_node(node).await {
                Ok(_) => result.written += 1,
                Err(e) => result.failed.push((id, e.to_string())),
            }
        }
        Ok(result)
    }

    async fn add_edges(&self, edges: Vec<CodeEdge>) -> Result<BatchWriteResult> {
        let mut result = BatchWriteResult::default();
        for edge in edges {
            let id = edge.id.clone();
            match self.add_edge(edge).await {
                Ok(_) => result.written += 1,
                Err(e) => result.failed.push((id, e.to_string())),
            }
        }
        Ok(result)
    }

    /// Nodes carrying an embedding, optionally restricted to some types.
    async fn nodes_with_embeddings(
        &self,
        project_id: &str,
        entity_types: Option<&[EntityType]>,
    ) -> Result<Vec<CodeNode>> {
        let mut nodes = Vec::new();
        for t in entity_types.unwrap_or(&EntityType::ALL) {
            nodes.extend(
                self.find_nodes_by_type(project_id, *t)
                    .await?
                    .into_iter()
                    .filter(|n| n.semantic_embedding.is_some()),
            );
        }
        Ok(nodes)
    }

    /// Ancestors reachable through `EXTENDS`, nearest first.
    async fn find_inheritance_hierarchy(
        &self,
        project_id: &str,
        class_id: &str,
    ) -> Result<Vec<CodeNode>> {
        if self.get_node(project_id, class_id).await?.is_none() {
            return Err(CodeGraphError::node_not_found(project_id, class_id));
        }
        let mut visited: HashSet<String> = HashSet::from([class_id.to_string()]);
        let mut queue = VecDeque::from([class_id.to_string()]);
        let mut ancestors = Vec::new();
        while let Some(current) = queue.pop_front() {
            for edge in self.find_edges_by_source(project_id, &current).await? {
                if edge.rel_type != RelationshipType::Extends
                    || !visited.insert(edge.target.clone())
                {
                    continue;
                }
                if let Some(parent) = self.get_node(project_id, &edge.target).await? {
                    ancestors.push(parent);
                }
                queue.push_back(edge.target);
            }
        }
        Ok(ancestors)
    }

    /// Classes with an `IMPLEMENTS` edge to an interface matching by id, name or qualified name.
    async fn find_classes_implementing_interface(
        &self,
        project_id: &str,
        interface: &str,
    ) -> Result<Vec<CodeNode>> {
        let mut seen = HashSet::new();
        let mut classes = Vec::new();
        for edge in self
            .find_edges_by_type(project_id, RelationshipType::Implements)
            .await?
        {
            let matches = edge.target == interface
                || CodeNode::simple_name(&edge.target) == interface
                || match self.get_node(project_id, &edge.target).await? {
                    Some(target) => target.name == interface || target.qualified_name == interface,
                    None => false,
                };
            if !matches || !seen.insert(edge.source.clone()) {
                continue;
            }
            if let Some(class) = self.get_node(project_id, &edge.source).await? {
                classes.push(class);
            }
        }
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    /// Classes whose contained methods call a method with the given name.
    async fn find_classes_calling_method(
        &self,
        project_id: &str,
        method_name: &str,
    ) -> Result<Vec<CodeNode>> {
        let mut seen = HashSet::new();
        let mut classes = Vec::new();
        for call in self
            .find_edges_by_type(project_id, RelationshipType::Calls)
            .await?
        {
            let called = match self.get_node(project_id, &call.target).await? {
                Some(target) => target.name == method_name,
                None => CodeNode::simple_name(&call.target) == method_name,
            };
            if !called {
                continue;
            }
            for owner_edge in self.find_edges_by_target(project_id, &call.source).await? {
                if owner_edge.rel_type != RelationshipType::Contains
                    || !seen.insert(owner_edge.source.clone())
                {
                    continue;
                }
                if let Some(owner) = self.get_node(project_id, &owner_edge.source).await? {
                    if owner.entity_type == EntityType::Class {
                        classes.push(owner);
                    }
                }
            }
        }
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    /// Breadth-first neighbourhood over edges in either direction, excluding the start node.
    async fn neighbors(
        &self,
        project_id: &str,
        node_id: &str,
        max_hops: usize,
        limit: usize,
    ) -> Result<Vec<CodeNode>> {
        let mut visited: HashSet<String> = HashSet::from([node_id.to_string()]);
        let mut frontier = vec![node_id.to_string()];
        let mut found = Vec::new();
        for _ in 0..max_hops {
            let mut next = Vec::new();
            for current in &frontier {
                let mut adjacent = self.find_edges_by_source(project_id, current).await?;
                adjacent.extend(self.find_edges_by_target(project_id, current).await?);
                for edge in adjacent {
                    let other = if &edge.source == current {
                        edge.target
                    } else {
                        edge.source
                    };
                    if !visited.insert(other.clone()) {
                        continue;
                    }
                    if let Some(node) = self.get_node(project_id, &other).await? {
                        found.push(node);
                        if found.len() >= limit {
                            return Ok(found);
                        }
                    }
                    next.push(other);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(found)
    }
}

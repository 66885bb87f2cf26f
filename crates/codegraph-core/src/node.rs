use crate::{AnnotationInfo, Attributes, EntityType, ParameterInfo, SemanticEmbedding};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub qualified_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_embedding: Option<SemanticEmbedding>,
}

impl CodeNode {
    pub fn new(
        project_id: impl Into<String>,
        entity_type: EntityType,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: qualified_name.clone(),
            project_id: project_id.into(),
            entity_type,
            name: name.into(),
            qualified_name,
            description: None,
            source_file: source_file.into(),
            start_line: None,
            end_line: None,
            modifiers: Vec::new(),
            attributes: Attributes::new(),
            semantic_embedding: None,
        }
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_modifiers<I, S>(mut self, modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifiers = modifiers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: SemanticEmbedding) -> Self {
        self.semantic_embedding = Some(embedding);
        self
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn annotations(&self) -> Vec<AnnotationInfo> {
        self.attributes
            .get("annotations")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn parameters(&self) -> Vec<ParameterInfo> {
        self.attributes
            .get("parameters")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn return_type(&self) -> Option<&str> {
        self.attributes.get("return_type").and_then(|v| v.as_str())
    }

    /// Interfaces count as abstract, as does anything flagged by its extractor.
    pub fn is_abstract(&self) -> bool {
        self.entity_type == EntityType::Interface
            || self.has_modifier("abstract")
            || self
                .attributes
                .get("is_abstract")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    pub fn embedding_vector(&self) -> Option<&[f32]> {
        self.semantic_embedding.as_ref().map(|e| e.vector.as_slice())
    }

    /// Folds a re-extracted node over the stored one. Structural fields come
    /// from `self`; the stored embedding survives when `self` carries none, and
    /// stored attribute keys that `self` does not set are kept.
    pub fn merged_over(mut self, stored: &CodeNode) -> Self {
        if self.semantic_embedding.is_none() {
            self.semantic_embedding = stored.semantic_embedding.clone();
        }
        for (key, value) in &stored.attributes {
            if !self.attributes.contains_key(key) {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
        self
    }

    /// Last dotted segment of a qualified name.
    pub fn simple_name(qualified_name: &str) -> &str {
        qualified_name.rsplit('.').next().unwrap_or(qualified_name)
    }
}

/// Partial update; `id` and `project_id` are immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_embedding: Option<SemanticEmbedding>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.qualified_name.is_none()
            && self.description.is_none()
            && self.source_file.is_none()
            && self.start_line.is_none()
            && self.end_line.is_none()
            && self.modifiers.is_none()
            && self.attributes.is_none()
            && self.semantic_embedding.is_none()
    }

    pub fn embedding(embedding: SemanticEmbedding) -> Self {
        Self {
            semantic_embedding: Some(embedding),
            ..Default::default()
        }
    }

    pub fn apply(self, node: &mut CodeNode) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(qualified_name) = self.qualified_name {
            node.qualified_name = qualified_name;
        }
        if let Some(description) = self.description {
            node.description = Some(description);
        }
        if let Some(source_file) = self.source_file {
            node.source_file = source_file;
        }
        if let Some(start_line) = self.start_line {
            node.start_line = Some(start_line);
        }
        if let Some(end_line) = self.end_line {
            node.end_line = Some(end_line);
        }
        if let Some(modifiers) = self.modifiers {
            node.modifiers = modifiers;
        }
        if let Some(attributes) = self.attributes {
            node.attributes.extend(attributes);
        }
        if let Some(embedding) = self.semantic_embedding {
            node.semantic_embedding = Some(embedding);
        }
    }
}

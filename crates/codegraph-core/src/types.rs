use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CodeEdge, CodeNode};

/// Schema-less payload carried by nodes and edges.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "javascript" | "js" => Ok(Language::JavaScript),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Module,
    Package,
    Class,
    Interface,
    Enum,
    Method,
    Function,
    Field,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::Module,
        EntityType::Package,
        EntityType::Class,
        EntityType::Interface,
        EntityType::Enum,
        EntityType::Method,
        EntityType::Function,
        EntityType::Field,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Module => "module",
            EntityType::Package => "package",
            EntityType::Class => "class",
            EntityType::Interface => "interface",
            EntityType::Enum => "enum",
            EntityType::Method => "method",
            EntityType::Function => "function",
            EntityType::Field => "field",
        }
    }

    /// Types that carry a body worth embedding.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            EntityType::Class
                | EntityType::Interface
                | EntityType::Method
                | EntityType::Function
                | EntityType::Enum
        )
    }

    pub fn is_type_declaration(&self) -> bool {
        matches!(
            self,
            EntityType::Class | EntityType::Interface | EntityType::Enum
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Contains,
    Extends,
    Implements,
    Calls,
    BelongsTo,
    References,
    Imports,
    DependsOn,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 8] = [
        RelationshipType::Contains,
        RelationshipType::Extends,
        RelationshipType::Implements,
        RelationshipType::Calls,
        RelationshipType::BelongsTo,
        RelationshipType::References,
        RelationshipType::Imports,
        RelationshipType::DependsOn,
    ];

    /// Lower snake form used inside relationship ids.
    pub fn id_fragment(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "contains",
            RelationshipType::Extends => "extends",
            RelationshipType::Implements => "implements",
            RelationshipType::Calls => "calls",
            RelationshipType::BelongsTo => "belongs_to",
            RelationshipType::References => "references",
            RelationshipType::Imports => "imports",
            RelationshipType::DependsOn => "depends_on",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::BelongsTo => "BELONGS_TO",
            RelationshipType::References => "REFERENCES",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::DependsOn => "DEPENDS_ON",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_uppercase();
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown relationship type: {}", s))
    }
}

/// Builds the canonical relationship id `{source}_{type}_{target}`.
pub fn relationship_id(source: &str, rel_type: RelationshipType, target: &str) -> String {
    format!("{}_{}_{}", source, rel_type.id_fragment(), target)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Annotation,
    Decorator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterValueType {
    String,
    Boolean,
    Null,
    Number,
    Collection,
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: ParameterValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    #[serde(default)]
    pub parameters: Vec<AnnotationParameter>,
    pub source_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEmbedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub version: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl SemanticEmbedding {
    pub fn new(vector: Vec<f32>, model: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            vector,
            model: model.into(),
            version: version.into(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Per-file, non-fatal extraction failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub file_path: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, file_path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            file_path: file_path.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file_path, self.line, self.message)
    }
}

/// Extractor output before it is scoped to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntity {
    pub id: String,
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
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ParsedEntity {
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: qualified_name.clone(),
            entity_type,
            name: name.into(),
            qualified_name,
            description: None,
            source_file: source_file.into(),
            start_line: None,
            end_line: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            parameters: Vec::new(),
            return_type: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Vec<String>) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Folds the typed extras into the open attribute map and scopes the entity.
    pub fn into_node(self, project_id: &str) -> CodeNode {
        let mut attributes = self.attributes;
        if !self.annotations.is_empty() {
            if let Ok(value) = serde_json::to_value(&self.annotations) {
                attributes.insert("annotations".into(), value);
            }
        }
        if !self.parameters.is_empty() {
            if let Ok(value) = serde_json::to_value(&self.parameters) {
                attributes.insert("parameters".into(), value);
            }
        }
        if let Some(return_type) = self.return_type {
            attributes.insert("return_type".into(), return_type.into());
        }

        CodeNode {
            id: self.id,
            project_id: project_id.to_string(),
            entity_type: self.entity_type,
            name: self.name,
            qualified_name: self.qualified_name,
            description: self.description,
            source_file: self.source_file,
            start_line: self.start_line,
            end_line: self.end_line,
            modifiers: self.modifiers,
            attributes,
            semantic_embedding: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub source: String,
    pub target: String,
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ParsedRelationship {
    pub fn new(
        rel_type: RelationshipType,
        source: impl Into<String>,
        target: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: relationship_id(&source, rel_type, &target),
            rel_type,
            source,
            target,
            source_file: source_file.into(),
            line: None,
            attributes: Attributes::new(),
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn into_edge(self, project_id: &str) -> CodeEdge {
        let mut attributes = self.attributes;
        attributes.insert("source_file".into(), self.source_file.into());
        if let Some(line) = self.line {
            attributes.insert("line".into(), line.into());
        }
        CodeEdge {
            id: self.id,
            project_id: project_id.to_string(),
            rel_type: self.rel_type,
            source: self.source,
            target: self.target,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_ids_use_snake_fragments() {
        assert_eq!(
            relationship_id("a.B", RelationshipType::BelongsTo, "a"),
            "a.B_belongs_to_a"
        );
        let rel = ParsedRelationship::new(RelationshipType::Extends, "p.Foo", "q.Bar", "Foo.java");
        assert_eq!(rel.id, "p.Foo_extends_q.Bar");
    }

    #[test]
    fn entity_type_round_trips_through_strings() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert_eq!("belongs_to".parse::<RelationshipType>().unwrap(), RelationshipType::BelongsTo);
        assert!("owns".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn parsed_entity_folds_extras_into_attributes() {
        let mut entity = ParsedEntity::new(EntityType::Method, "run", "pkg.Job.run", "Job.java");
        entity.return_type = Some("void".into());
        entity.parameters.push(ParameterInfo {
            name: "count".into(),
            type_name: Some("int".into()),
            description: None,
        });
        let node = entity.into_node("proj");
        assert_eq!(node.project_id, "proj");
        assert_eq!(node.id, "pkg.Job.run");
        assert_eq!(node.attributes["return_type"], "void");
        assert_eq!(node.parameters().len(), 1);
    }

    #[test]
    fn serialized_node_uses_type_key() {
        let node = ParsedEntity::new(EntityType::Class, "Foo", "p.Foo", "Foo.java").into_node("x");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "class");
    }
}

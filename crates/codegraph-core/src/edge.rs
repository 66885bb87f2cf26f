use crate::{relationship_id, Attributes, RelationshipType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEdge {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl CodeEdge {
    pub fn new(
        project_id: impl Into<String>,
        rel_type: RelationshipType,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: relationship_id(&source, rel_type, &target),
            project_id: project_id.into(),
            rel_type,
            source,
            target,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Partial edge update. The id is derived from `source`, `type` and `target`,
/// so only attributes may change; a request naming any other field is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl EdgeUpdate {
    pub fn attributes(attributes: Attributes) -> Self {
        Self {
            attributes: Some(attributes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_none()
    }

    pub fn apply(self, edge: &mut CodeEdge) {
        if let Some(attributes) = self.attributes {
            edge.attributes.extend(attributes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_follows_source_type_target() {
        let edge = CodeEdge::new("p", RelationshipType::Extends, "a.Leaf", "a.Base");
        assert_eq!(edge.id, "a.Leaf_extends_a.Base");
    }

    #[test]
    fn update_cannot_retype_an_edge() {
        let retype = serde_json::json!({ "type": "calls" });
        assert!(serde_json::from_value::<EdgeUpdate>(retype).is_err());

        let mut edge = CodeEdge::new("p", RelationshipType::Calls, "a.run", "a.save");
        let update: EdgeUpdate =
            serde_json::from_value(serde_json::json!({ "attributes": { "line": 4 } })).unwrap();
        update.apply(&mut edge);
        assert_eq!(edge.rel_type, RelationshipType::Calls);
        assert_eq!(edge.id, "a.run_calls_a.save");
        assert_eq!(edge.attributes["line"], 4);
    }
}

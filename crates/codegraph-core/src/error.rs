use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Node not found: {id} (project {project_id})")]
    NodeNotFound { id: String, project_id: String },

    #[error("Edge not found: {id} (project {project_id})")]
    EdgeNotFound { id: String, project_id: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Semantic search is disabled")]
    EmbeddingDisabled,

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Vector error: {0}")]
    Vector(String),
}

impl CodeGraphError {
    pub fn node_not_found(project_id: &str, id: &str) -> Self {
        Self::NodeNotFound {
            id: id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn edge_not_found(project_id: &str, id: &str) -> Self {
        Self::EdgeNotFound {
            id: id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::EdgeNotFound { .. } | Self::ProjectNotFound(_)
        )
    }
}

impl From<config::ConfigError> for CodeGraphError {
    fn from(err: config::ConfigError) -> Self {
        CodeGraphError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodeGraphError>;

use codegraph_core::CodeGraphError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorError>;

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),

    #[error("Semantic search is disabled")]
    Disabled,

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<VectorError> for CodeGraphError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::Disabled => CodeGraphError::EmbeddingDisabled,
            VectorError::DimensionMismatch(..) => CodeGraphError::Vector(err.to_string()),
            other => CodeGraphError::EmbeddingProvider(other.to_string()),
        }
    }
}

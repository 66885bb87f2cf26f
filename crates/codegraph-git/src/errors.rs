use codegraph_core::CodeGraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitError>;

/// Machine-distinguishable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GitErrorCode {
    InvalidUrl,
    UnsupportedUrlFormat,
    CloneFailed,
    ValidationFailed,
    RepositoryNotFound,
    TempDirFailed,
    CacheFailed,
}

impl GitErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitErrorCode::InvalidUrl => "INVALID_URL",
            GitErrorCode::UnsupportedUrlFormat => "UNSUPPORTED_URL_FORMAT",
            GitErrorCode::CloneFailed => "CLONE_FAILED",
            GitErrorCode::ValidationFailed => "VALIDATION_FAILED",
            GitErrorCode::RepositoryNotFound => "REPOSITORY_NOT_FOUND",
            GitErrorCode::TempDirFailed => "TEMP_DIR_FAILED",
            GitErrorCode::CacheFailed => "CACHE_FAILED",
        }
    }
}

impl fmt::Display for GitErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("[{code}] {message}{}", .url.as_deref().map(|u| format!(" ({})", u)).unwrap_or_default())]
pub struct GitError {
    pub code: GitErrorCode,
    pub message: String,
    pub url: Option<String>,
}

impl GitError {
    pub fn new(code: GitErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn invalid_url(url: &str, message: impl Into<String>) -> Self {
        Self::new(GitErrorCode::InvalidUrl, message).with_url(url)
    }

    pub fn clone_failed(url: &str, message: impl Into<String>) -> Self {
        Self::new(GitErrorCode::CloneFailed, message).with_url(url)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(GitErrorCode::CacheFailed, message)
    }
}

impl From<GitError> for CodeGraphError {
    fn from(err: GitError) -> Self {
        CodeGraphError::Git(err.to_string())
    }
}

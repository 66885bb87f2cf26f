//! Remote repository acquisition for CodeGraph: URL parsing, credential
//! resolution, a TTL clone cache, and clone/validate/cleanup on libgit2.

pub mod auth;
pub mod cache;
pub mod errors;
pub mod manager;
pub mod url;

pub use auth::{
    AuthMethod, AuthValidation, Credentials, GitAuthConfig, GitAuthManager, ResolvedAuth,
};
pub use cache::{cache_key, CacheEntry, CacheOptions, CacheStats, GitCacheManager};
pub use errors::{GitError, GitErrorCode, Result};
pub use manager::{
    CloneOptions, CloneProgress, CloneStage, ClonedRepository, GitRepositoryManager,
    ProgressCallback, RepositoryInfo,
};
pub use url::{build_clone_url, is_git_url, validate_url, GitProtocol, GitProvider, ParsedGitUrl};

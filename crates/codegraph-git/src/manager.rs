use crate::auth::{GitAuthConfig, GitAuthManager, ResolvedAuth};
use crate::cache::{last_commit_hash, CacheOptions, CacheStats, GitCacheManager};
use crate::errors::{GitError, GitErrorCode, Result};
use crate::url::{GitProtocol, ParsedGitUrl};
use codegraph_core::GitSettings;
use git2::build::RepoBuilder;
use git2::{Direction, FetchOptions, Remote};
use parking_lot::RwLock;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStage {
    Validating,
    Cloning,
    Caching,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneProgress {
    pub stage: CloneStage,
    pub message: String,
    pub percentage: Option<f32>,
}

pub type ProgressCallback = Arc<dyn Fn(&CloneProgress) + Send + Sync>;

#[derive(Clone)]
pub struct CloneOptions {
    /// Falls back to the branch in the URL, then the configured default.
    pub branch: Option<String>,
    pub depth: Option<u32>,
    pub single_branch: bool,
    pub use_cache: bool,
    pub force_refresh: bool,
    /// Overrides every configured credential for this clone.
    pub token: Option<SecretString>,
    /// Parent for the fresh checkout directory; the directory itself and
    /// anything already in it are left alone.
    pub temp_dir: Option<PathBuf>,
    pub progress: Option<ProgressCallback>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            depth: Some(1),
            single_branch: true,
            use_cache: true,
            force_refresh: false,
            token: None,
            temp_dir: None,
            progress: None,
        }
    }
}

impl fmt::Debug for CloneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneOptions")
            .field("branch", &self.branch)
            .field("depth", &self.depth)
            .field("single_branch", &self.single_branch)
            .field("use_cache", &self.use_cache)
            .field("force_refresh", &self.force_refresh)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("temp_dir", &self.temp_dir)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Where a clone ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonedRepository {
    pub path: PathBuf,
    pub branch: String,
    pub from_cache: bool,
    /// Temporary checkout the caller must clean up; `None` when `path` is
    /// the cache copy.
    pub temp_dir: Option<PathBuf>,
    pub last_commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub branch: String,
}

struct Reporter(Option<ProgressCallback>);

impl Reporter {
    fn report(&self, stage: CloneStage, message: impl Into<String>, percentage: Option<f32>) {
        let progress = CloneProgress {
            stage,
            message: message.into(),
            percentage,
        };
        debug!("[{:?}] {}", progress.stage, progress.message);
        if let Some(callback) = &self.0 {
            callback(&progress);
        }
    }
}

/// Clones, validates and caches remote repositories.
pub struct GitRepositoryManager {
    auth: Arc<RwLock<GitAuthManager>>,
    cache: Arc<GitCacheManager>,
    default_branch: String,
}

impl GitRepositoryManager {
    pub fn new(settings: &GitSettings) -> Self {
        Self::with_components(
            GitAuthManager::from_settings(settings),
            GitCacheManager::new(CacheOptions::from_settings(settings)),
            settings.default_branch.clone(),
        )
    }

    pub fn with_components(
        auth: GitAuthManager,
        cache: GitCacheManager,
        default_branch: String,
    ) -> Self {
        Self {
            auth: Arc::new(RwLock::new(auth)),
            cache: Arc::new(cache),
            default_branch,
        }
    }

    pub fn cache(&self) -> &Arc<GitCacheManager> {
        &self.cache
    }

    pub fn parse_git_url(&self, url: &str) -> Result<ParsedGitUrl> {
        ParsedGitUrl::parse(url)
    }

    pub fn is_git_url(&self, url: &str) -> bool {
        crate::url::is_git_url(url)
    }

    pub fn update_auth_config(&self, config: GitAuthConfig) {
        self.auth.write().update_config(config);
    }

    /// Clones `url`, serving from the cache when allowed and fresh.
    pub async fn clone_repository(
        &self,
        url: &str,
        options: CloneOptions,
    ) -> Result<ClonedRepository> {
        let parsed = ParsedGitUrl::parse(url)?;
        let branch = options
            .branch
            .clone()
            .or_else(|| parsed.branch.clone())
            .unwrap_or_else(|| self.default_branch.clone());
        let auth = self.auth.read().clone();
        let cache = Arc::clone(&self.cache);
        let url_owned = url.to_string();

        tokio::task::spawn_blocking(move || {
            clone_blocking(&auth, &cache, &parsed, &branch, &options)
        })
        .await
        .map_err(|e| GitError::clone_failed(&url_owned, format!("Clone task failed: {}", e)))?
    }

    /// Lists the remote's refs without cloning.
    pub async fn validate_repository(
        &self,
        url: &str,
        token: Option<SecretString>,
    ) -> Result<RepositoryInfo> {
        let parsed = ParsedGitUrl::parse(url)?;
        let resolved = self.auth.read().resolve(&parsed, token.as_ref());
        let url_owned = url.to_string();

        tokio::task::spawn_blocking(move || validate_blocking(&parsed, &resolved))
            .await
            .map_err(|e| {
                GitError::new(
                    GitErrorCode::ValidationFailed,
                    format!("Validation task failed: {}", e),
                )
                .with_url(url_owned)
            })?
    }

    /// Best-effort removal of a temporary checkout. Paths inside the cache
    /// root are refused.
    pub async fn cleanup(&self, path: &Path) -> bool {
        if self.cache.contains_path(path) {
            warn!("Refusing to clean up cached repository {}", path.display());
            return false;
        }
        info!("Cleaning up temporary directory: {}", path.display());
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to clean up temporary directory {}: {}", path.display(), e);
                false
            }
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || {
            cache.initialize()?;
            Ok(cache.stats())
        })
        .await
        .map_err(|e| GitError::cache(format!("Cache task failed: {}", e)))?
    }

    pub async fn clear_cache(&self) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.clear())
            .await
            .map_err(|e| GitError::cache(format!("Cache task failed: {}", e)))?
    }
}

fn clone_blocking(
    auth: &GitAuthManager,
    cache: &GitCacheManager,
    parsed: &ParsedGitUrl,
    branch: &str,
    options: &CloneOptions,
) -> Result<ClonedRepository> {
    let reporter = Reporter(options.progress.clone());

    if options.use_cache {
        cache.initialize()?;
        if !options.force_refresh {
            reporter.report(
                CloneStage::Validating,
                "Checking cache for existing repository...",
                None,
            );
            if let Some(path) = cache.get_cached_repository(parsed, branch) {
                info!("Using cached repository: {}", path.display());
                reporter.report(CloneStage::Completed, "Repository loaded from cache", Some(100.0));
                return Ok(ClonedRepository {
                    last_commit: last_commit_hash(&path),
                    path,
                    branch: branch.to_string(),
                    from_cache: true,
                    temp_dir: None,
                });
            }
        }
    }

    reporter.report(CloneStage::Validating, "Loading authentication configuration...", None);
    let validation = auth.validate(parsed, options.token.as_ref());
    for warning in &validation.warnings {
        warn!("Authentication warning: {}", warning);
    }

    reporter.report(CloneStage::Cloning, "Creating temporary directory...", Some(10.0));
    let temp_dir = create_temp_dir(options.temp_dir.as_deref())?;

    let resolved = auth.resolve(parsed, options.token.as_ref());
    info!("Authentication method: {}", resolved.method);
    info!("Cloning repository: {} into {}", parsed.full_name(), temp_dir.display());
    reporter.report(
        CloneStage::Cloning,
        format!("Cloning {}...", parsed.full_name()),
        Some(30.0),
    );

    if let Err(e) = fetch_into(parsed, &resolved, branch, options, &temp_dir) {
        remove_temp_dir(&temp_dir);
        return Err(clone_error(parsed, e));
    }
    reporter.report(CloneStage::Cloning, "Repository cloned successfully", Some(90.0));

    if options.use_cache {
        reporter.report(CloneStage::Caching, "Adding repository to cache...", Some(95.0));
        let cached = if options.force_refresh {
            cache.update_cache_entry(parsed, branch, &temp_dir)
        } else {
            cache.add_to_cache(parsed, branch, &temp_dir)
        };
        match cached {
            Ok(path) => {
                remove_temp_dir(&temp_dir);
                reporter.report(
                    CloneStage::Completed,
                    "Repository cached successfully",
                    Some(100.0),
                );
                return Ok(ClonedRepository {
                    last_commit: last_commit_hash(&path),
                    path,
                    branch: branch.to_string(),
                    from_cache: false,
                    temp_dir: None,
                });
            }
            Err(e) => warn!(
                "Failed to cache repository, continuing with temporary directory: {}",
                e
            ),
        }
    }

    reporter.report(CloneStage::Completed, "Repository ready for scanning", Some(100.0));
    Ok(ClonedRepository {
        last_commit: last_commit_hash(&temp_dir),
        path: temp_dir.clone(),
        branch: branch.to_string(),
        from_cache: false,
        temp_dir: Some(temp_dir),
    })
}

/// Always a directory created by this call, so cleanup never reaches outside it.
fn create_temp_dir(preferred: Option<&Path>) -> Result<PathBuf> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("codegraph-git-");
    let created = match preferred {
        Some(parent) => std::fs::create_dir_all(parent).and_then(|_| builder.tempdir_in(parent)),
        None => builder.tempdir(),
    }
    .map(|dir| dir.keep());
    created.map_err(|e| {
        GitError::new(
            GitErrorCode::TempDirFailed,
            format!("Failed to create temporary directory: {}", e),
        )
    })
}

fn remove_temp_dir(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!("Failed to clean up temporary directory {}: {}", path.display(), e);
    }
}

fn fetch_into(
    parsed: &ParsedGitUrl,
    resolved: &ResolvedAuth,
    branch: &str,
    options: &CloneOptions,
    target: &Path,
) -> std::result::Result<(), git2::Error> {
    let mut callbacks = resolved.remote_callbacks();
    if let Some(progress) = options.progress.clone() {
        let mut last_reported = -1i32;
        callbacks.transfer_progress(move |stats| {
            let total = stats.total_objects();
            if total > 0 {
                let percentage = 30.0 + (stats.received_objects() as f32 / total as f32) * 60.0;
                if percentage as i32 != last_reported {
                    last_reported = percentage as i32;
                    progress(&CloneProgress {
                        stage: CloneStage::Cloning,
                        message: format!("receiving objects: {}%", percentage.round()),
                        percentage: Some(percentage),
                    });
                }
            }
            true
        });
    }

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    // libgit2's local transport cannot serve shallow fetches.
    if let Some(depth) = options.depth.filter(|_| parsed.protocol != GitProtocol::File) {
        fetch.depth(depth as i32);
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch).branch(branch);
    if options.single_branch {
        let branch = branch.to_string();
        builder.remote_create(move |repo, name, url| {
            let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, name);
            repo.remote_with_fetch(name, url, &refspec)
        });
    }

    builder.clone(&resolved.clone_url, target)?;
    Ok(())
}

fn clone_error(parsed: &ParsedGitUrl, err: git2::Error) -> GitError {
    let mut message = format!("Failed to clone repository: {}", err.message());
    let lower = err.message().to_ascii_lowercase();
    if lower.contains("authentication") || err.class() == git2::ErrorClass::Ssh {
        message.push_str(" (check your authentication tokens or SSH keys)");
    } else if lower.contains("not found") || err.code() == git2::ErrorCode::NotFound {
        message.push_str(" (verify the repository URL and access permissions)");
    }
    GitError::clone_failed(&parsed.original_url, message)
}

fn validate_blocking(parsed: &ParsedGitUrl, resolved: &ResolvedAuth) -> Result<RepositoryInfo> {
    let validation_error = |e: git2::Error| {
        GitError::new(
            GitErrorCode::ValidationFailed,
            format!("Failed to validate repository: {}", e.message()),
        )
        .with_url(parsed.original_url.clone())
    };

    let mut remote =
        Remote::create_detached(resolved.clone_url.as_str()).map_err(validation_error)?;
    let connection = remote
        .connect_auth(Direction::Fetch, Some(resolved.remote_callbacks()), None)
        .map_err(validation_error)?;

    let heads = connection.list().map_err(validation_error)?;
    if heads.is_empty() {
        return Err(GitError::new(
            GitErrorCode::RepositoryNotFound,
            "Repository not found or not accessible",
        )
        .with_url(parsed.original_url.clone()));
    }

    let remote_default = connection
        .default_branch()
        .ok()
        .and_then(|buf| buf.as_str().map(|s| s.trim_start_matches("refs/heads/").to_string()));
    let branch = parsed
        .branch
        .clone()
        .or(remote_default)
        .unwrap_or_else(|| "main".to_string());

    Ok(RepositoryInfo {
        name: parsed.repo.clone(),
        full_name: parsed.full_name(),
        url: parsed.original_url.clone(),
        branch,
    })
}

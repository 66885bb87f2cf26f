use crate::errors::{GitError, Result};
use crate::url::ParsedGitUrl;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use codegraph_core::GitSettings;
use git2::Repository;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub max_age: Duration,
    pub max_size_bytes: u64,
    pub cache_dir: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from_settings(&GitSettings::default())
    }
}

impl CacheOptions {
    pub fn from_settings(settings: &GitSettings) -> Self {
        Self {
            max_age: settings.cache_max_age(),
            max_size_bytes: settings.cache_max_size_bytes,
            cache_dir: settings.cache_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub branch: String,
    pub last_updated: DateTime<Utc>,
    pub last_commit: Option<String>,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Cache key: the first 16 hex chars of `sha256("host/owner/repo/branch")`.
pub fn cache_key(parsed: &ParsedGitUrl, branch: &str) -> String {
    let key = format!("{}/{}/{}/{}", parsed.host, parsed.owner, parsed.repo, branch);
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    digest[..16].to_string()
}

/// On-disk clone cache with an `index.json` catalogue.
///
/// The index is guarded by one mutex; every mutation is written back
/// before the lock is released.
#[derive(Debug)]
pub struct GitCacheManager {
    options: CacheOptions,
    index: Mutex<HashMap<String, CacheEntry>>,
}

impl GitCacheManager {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.options.cache_dir
    }

    /// True when `path` lives under the cache root.
    pub fn contains_path(&self, path: &Path) -> bool {
        let root = fs::canonicalize(&self.options.cache_dir)
            .unwrap_or_else(|_| self.options.cache_dir.clone());
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        path.starts_with(root)
    }

    /// Creates the cache root, loads the index and evicts expired entries.
    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.options.cache_dir).map_err(|e| {
            GitError::cache(format!(
                "Failed to create cache directory {}: {}",
                self.options.cache_dir.display(),
                e
            ))
        })?;

        let mut index = self.index.lock();
        *index = self.load_index();

        let expired: Vec<String> = index
            .iter()
            .filter(|(_, entry)| self.is_expired(entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = index.remove(key) {
                remove_dir(&entry.local_path);
            }
        }
        if !expired.is_empty() {
            info!("Evicted {} expired git cache entries", expired.len());
            self.save_index(&index);
        }
        Ok(())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let max_age = ChronoDuration::from_std(self.options.max_age)
            .unwrap_or_else(|_| ChronoDuration::days(36_500));
        Utc::now() - entry.last_updated > max_age
    }

    /// Cached working copy for `branch`, if present on disk and not expired.
    pub fn get_cached_repository(&self, parsed: &ParsedGitUrl, branch: &str) -> Option<PathBuf> {
        let key = cache_key(parsed, branch);
        let mut index = self.index.lock();
        let entry = index.get(&key)?;

        if self.is_expired(entry) {
            debug!("Cache entry for {} expired", parsed.full_name());
        } else if entry.local_path.is_dir() {
            return Some(entry.local_path.clone());
        } else {
            debug!("Cache directory for {} disappeared", parsed.full_name());
        }

        if let Some(entry) = index.remove(&key) {
            remove_dir(&entry.local_path);
        }
        self.save_index(&index);
        None
    }

    /// Copies a fresh clone into the cache and records its HEAD commit.
    pub fn add_to_cache(
        &self,
        parsed: &ParsedGitUrl,
        branch: &str,
        source: &Path,
    ) -> Result<PathBuf> {
        let key = cache_key(parsed, branch);
        let target = self.options.cache_dir.join(&key);

        if target.exists() {
            remove_dir(&target);
        }
        copy_dir(source, &target).map_err(|e| {
            GitError::cache(format!("Failed to copy repository into cache: {}", e))
                .with_url(parsed.original_url.clone())
        })?;

        let entry = CacheEntry {
            url: parsed.original_url.clone(),
            branch: branch.to_string(),
            last_updated: Utc::now(),
            last_commit: last_commit_hash(&target),
            local_path: target.clone(),
        };

        let mut index = self.index.lock();
        index.insert(key.clone(), entry);
        self.enforce_size_limit(&mut index, &key);
        self.save_index(&index);
        info!("Cached {} ({}) at {}", parsed.full_name(), branch, target.display());
        Ok(target)
    }

    /// Replaces the cached copy for `branch` with `source`.
    pub fn update_cache_entry(
        &self,
        parsed: &ParsedGitUrl,
        branch: &str,
        source: &Path,
    ) -> Result<PathBuf> {
        self.remove_cache_entry(&cache_key(parsed, branch));
        self.add_to_cache(parsed, branch, source)
    }

    pub fn remove_cache_entry(&self, key: &str) -> bool {
        let mut index = self.index.lock();
        match index.remove(key) {
            Some(entry) => {
                remove_dir(&entry.local_path);
                self.save_index(&index);
                true
            }
            None => false,
        }
    }

    /// Evicts least recently updated entries until the cache fits, never
    /// evicting `keep`.
    fn enforce_size_limit(&self, index: &mut HashMap<String, CacheEntry>, keep: &str) {
        let mut sizes: Vec<(String, DateTime<Utc>, u64)> = index
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_updated, dir_size(&entry.local_path)))
            .collect();
        let mut total: u64 = sizes.iter().map(|(_, _, size)| size).sum();
        if total <= self.options.max_size_bytes {
            return;
        }

        sizes.sort_by(|a, b| a.1.cmp(&b.1));
        for (key, _, size) in sizes {
            if total <= self.options.max_size_bytes {
                break;
            }
            if key == keep {
                continue;
            }
            if let Some(entry) = index.remove(&key) {
                info!("Evicting cached repository {} to respect size limit", entry.url);
                remove_dir(&entry.local_path);
                total = total.saturating_sub(size);
            }
        }
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.index.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.last_updated.cmp(&b.last_updated));
        entries
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.index.lock();
        let mut stats = CacheStats {
            entries: index.len(),
            ..Default::default()
        };
        for entry in index.values() {
            if !entry.local_path.exists() {
                continue;
            }
            stats.total_size_bytes += dir_size(&entry.local_path);
            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(oldest) if oldest <= entry.last_updated => oldest,
                _ => entry.last_updated,
            });
            stats.newest_entry = Some(match stats.newest_entry {
                Some(newest) if newest >= entry.last_updated => newest,
                _ => entry.last_updated,
            });
        }
        stats
    }

    /// Removes every cached repository and starts a fresh index.
    pub fn clear(&self) -> Result<()> {
        let mut index = self.index.lock();
        if self.options.cache_dir.exists() {
            fs::remove_dir_all(&self.options.cache_dir)
                .map_err(|e| GitError::cache(format!("Failed to clear git cache: {}", e)))?;
        }
        fs::create_dir_all(&self.options.cache_dir)
            .map_err(|e| GitError::cache(format!("Failed to recreate cache directory: {}", e)))?;
        index.clear();
        self.save_index(&index);
        info!("Cleared git cache at {}", self.options.cache_dir.display());
        Ok(())
    }

    fn load_index(&self) -> HashMap<String, CacheEntry> {
        let path = self.options.cache_dir.join(INDEX_FILE);
        let Ok(data) = fs::read_to_string(&path) else {
            return HashMap::new();
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("Ignoring unreadable cache index {}: {}", path.display(), e);
            HashMap::new()
        })
    }

    fn save_index(&self, index: &HashMap<String, CacheEntry>) {
        let path = self.options.cache_dir.join(INDEX_FILE);
        let result = serde_json::to_string_pretty(index)
            .map_err(io::Error::other)
            .and_then(|json| fs::write(&path, json));
        if let Err(e) = result {
            warn!("Failed to save cache index {}: {}", path.display(), e);
        }
    }
}

fn remove_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove cached directory {}: {}", path.display(), e);
        }
    }
}

/// Mirrors `source` into `target`. Symlinks are recreated as links rather
/// than followed, so the copy matches the checkout.
fn copy_dir(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let dest = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest)?;
        } else {
            debug!("Skipping special file {}", entry.path().display());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, dest)
}

#[cfg(windows)]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(link)?;
    if link.is_dir() {
        std::os::windows::fs::symlink_dir(target, dest)
    } else {
        std::os::windows::fs::symlink_file(target, dest)
    }
}

#[cfg(not(any(unix, windows)))]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(link, dest).map(|_| ())
}

/// Bytes held by regular files below `path`; links are not followed.
fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Commit id HEAD resolves to, whether HEAD is a branch, a detached commit or
/// a linked worktree.
pub fn last_commit_hash(repo_path: &Path) -> Option<String> {
    let resolve = || -> std::result::Result<git2::Oid, git2::Error> {
        let repo = Repository::open(repo_path)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id())
    };
    match resolve() {
        Ok(id) => Some(id.to_string()),
        Err(e) => {
            debug!("No commit for {}: {}", repo_path.display(), e.message());
            None
        }
    }
}

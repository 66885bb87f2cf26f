use codegraph_core::{Language, ScanSettings};
use codegraph_git::is_git_url;
use codegraph_parser::FileCollectionConfig;
use secrecy::SecretString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Graph writes are issued in chunks of this many nodes or edges.
pub const DEFAULT_WRITE_BATCH: usize = 100;

/// Remote source for a scan. The working copy is cloned (or served from the
/// cache) before the local scan runs.
#[derive(Clone)]
pub struct RemoteScan {
    pub url: String,
    pub branch: Option<String>,
    pub use_cache: bool,
    pub token: Option<SecretString>,
    /// Remove the temporary checkout once the scan finishes.
    pub cleanup_temp: bool,
}

impl RemoteScan {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            use_cache: true,
            token: None,
            cleanup_temp: true,
        }
    }
}

impl fmt::Debug for RemoteScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteScan")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("use_cache", &self.use_cache)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("cleanup_temp", &self.cleanup_temp)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Local tree to scan. Ignored when `git` is set.
    pub project_path: PathBuf,
    pub project_id: String,
    /// Defaults to the directory or repository name.
    pub project_name: Option<String>,
    /// Empty means every supported language.
    pub languages: Vec<Language>,
    pub exclude_paths: Vec<String>,
    pub include_tests: bool,
    pub max_depth: Option<usize>,
    pub workers: usize,
    pub batch_size: usize,
    /// Drop the project's nodes and edges before writing.
    pub clear_graph: bool,
    pub generate_embeddings: bool,
    pub git: Option<RemoteScan>,
}

impl ScanConfig {
    pub fn local(project_path: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            project_id: project_id.into(),
            project_name: None,
            languages: Vec::new(),
            exclude_paths: Vec::new(),
            include_tests: false,
            max_depth: None,
            workers: num_cpus::get().max(1),
            batch_size: DEFAULT_WRITE_BATCH,
            clear_graph: false,
            generate_embeddings: false,
            git: None,
        }
    }

    pub fn remote(url: impl Into<String>, project_id: impl Into<String>) -> Self {
        let mut config = Self::local(PathBuf::new(), project_id);
        config.git = Some(RemoteScan::new(url));
        config
    }

    /// A git URL becomes a remote scan, anything else a local path.
    pub fn from_source(source: &str, project_id: impl Into<String>) -> Self {
        if is_git_url(source) {
            Self::remote(source, project_id)
        } else {
            Self::local(source, project_id)
        }
    }

    /// Applies configured defaults; explicit exclude entries are kept.
    pub fn with_settings(mut self, settings: &ScanSettings) -> Self {
        self.workers = settings.workers.max(1);
        self.batch_size = settings.batch_size.max(1);
        self.include_tests = settings.include_tests;
        self.max_depth = settings.max_depth;
        self.generate_embeddings = settings.generate_embeddings;
        self.exclude_paths.extend(settings.exclude_paths.iter().cloned());
        self
    }

    pub fn is_remote(&self) -> bool {
        self.git.is_some()
    }

    pub(crate) fn collection_config(&self) -> FileCollectionConfig {
        FileCollectionConfig {
            languages: self.languages.clone(),
            include_tests: self.include_tests,
            exclude_patterns: self.exclude_paths.clone(),
            max_depth: self.max_depth,
        }
    }

    pub(crate) fn project_name_for(&self, root: &Path) -> String {
        self.project_name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.project_id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_detection() {
        let remote = ScanConfig::from_source("https://github.com/acme/widgets.git", "w");
        assert!(remote.is_remote());
        assert_eq!(remote.git.as_ref().unwrap().url, "https://github.com/acme/widgets.git");
        assert!(remote.git.as_ref().unwrap().cleanup_temp);

        let local = ScanConfig::from_source("./services/api", "api");
        assert!(!local.is_remote());
        assert_eq!(local.project_path, PathBuf::from("./services/api"));
        assert_eq!(local.batch_size, DEFAULT_WRITE_BATCH);
    }

    #[test]
    fn settings_fill_defaults() {
        let settings = ScanSettings {
            workers: 3,
            include_tests: true,
            exclude_paths: vec!["generated".into()],
            ..Default::default()
        };
        let mut config = ScanConfig::local("/src", "p");
        config.exclude_paths.push("vendor".into());
        let config = config.with_settings(&settings);
        assert_eq!(config.workers, 3);
        assert!(config.include_tests);
        assert_eq!(config.exclude_paths, vec!["vendor".to_string(), "generated".to_string()]);
    }

    #[test]
    fn project_name_defaults_to_directory() {
        let config = ScanConfig::local("/work/billing", "b");
        assert_eq!(config.project_name_for(Path::new("/work/billing")), "billing");

        let mut named = config.clone();
        named.project_name = Some("Billing".into());
        assert_eq!(named.project_name_for(Path::new("/work/billing")), "Billing");
    }

    #[test]
    fn token_is_redacted() {
        let mut remote = RemoteScan::new("https://github.com/acme/widgets");
        remote.token = Some(SecretString::from("ghp_secret".to_string()));
        assert!(!format!("{:?}", remote).contains("ghp_secret"));
    }
}

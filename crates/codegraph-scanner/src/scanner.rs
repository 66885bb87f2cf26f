use crate::config::{RemoteScan, ScanConfig};
use crate::report::{RemoteValidation, ScanResult};
use codegraph_core::{
    CodeEdge, CodeGraphConfig, CodeGraphError, CodeNode, EntityType, GraphStore, ParseError,
    Project, Result,
};
use codegraph_git::{CacheStats, CloneOptions, GitRepositoryManager, RepositoryInfo};
use codegraph_parser::{
    collect_source_files_with_config, PackageRegistry, ParseResult, TreeSitterParser,
};
use codegraph_vector::{EmbeddingService, SemanticSearchManager};
use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entity types embedded after a scan.
pub const EMBEDDED_ENTITY_TYPES: [EntityType; 5] = [
    EntityType::Class,
    EntityType::Interface,
    EntityType::Method,
    EntityType::Function,
    EntityType::Enum,
];

/// Called with `(files_done, files_total)` as extraction progresses.
pub type ScanProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Scan entrypoint: turns a local tree or a git URL into graph facts.
pub struct CodebaseScanner {
    store: Arc<dyn GraphStore>,
    parser: TreeSitterParser,
    git: Arc<GitRepositoryManager>,
    search: Arc<SemanticSearchManager>,
}

impl CodebaseScanner {
    pub fn new(
        store: Arc<dyn GraphStore>,
        git: Arc<GitRepositoryManager>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        let search = Arc::new(SemanticSearchManager::new(Arc::clone(&store), embeddings));
        Self {
            store,
            parser: TreeSitterParser::new(),
            git,
            search,
        }
    }

    pub fn from_config(config: &CodeGraphConfig, store: Arc<dyn GraphStore>) -> Self {
        Self::new(
            store,
            Arc::new(GitRepositoryManager::new(&config.git)),
            Arc::new(EmbeddingService::from_settings(config.embedding.clone())),
        )
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn git(&self) -> &Arc<GitRepositoryManager> {
        &self.git
    }

    pub fn search(&self) -> &Arc<SemanticSearchManager> {
        &self.search
    }

    pub async fn scan(&self, config: &ScanConfig) -> Result<ScanResult> {
        self.scan_with_progress(config, None).await
    }

    pub async fn scan_with_progress(
        &self,
        config: &ScanConfig,
        progress: Option<ScanProgressCallback>,
    ) -> Result<ScanResult> {
        if config.project_id.trim().is_empty() {
            return Err(CodeGraphError::InvalidOperation(
                "project_id must not be empty".to_string(),
            ));
        }
        match &config.git {
            Some(remote) => self.scan_remote(config, remote, progress).await,
            None => self.scan_local(config, &config.project_path, progress).await,
        }
    }

    /// Validate, clone, scan the working copy, then drop the temporary
    /// checkout whether or not the scan succeeded.
    async fn scan_remote(
        &self,
        config: &ScanConfig,
        remote: &RemoteScan,
        progress: Option<ScanProgressCallback>,
    ) -> Result<ScanResult> {
        info!("Scanning remote repository {}", remote.url);
        let info = self
            .git
            .validate_repository(&remote.url, remote.token.clone())
            .await?;

        let options = CloneOptions {
            branch: remote.branch.clone().or_else(|| Some(info.branch.clone())),
            use_cache: remote.use_cache,
            token: remote.token.clone(),
            ..Default::default()
        };
        let cloned = self.git.clone_repository(&remote.url, options).await?;
        info!(
            "Working copy for {} at {} (from cache: {})",
            info.full_name,
            cloned.path.display(),
            cloned.from_cache
        );

        let mut local = config.clone();
        if local.project_name.is_none() {
            local.project_name = Some(info.name.clone());
        }
        let outcome = self.scan_local(&local, &cloned.path, progress).await;

        if remote.cleanup_temp {
            if let Some(temp) = &cloned.temp_dir {
                if !self.git.cleanup(temp).await {
                    warn!("Temporary checkout left behind at {}", temp.display());
                }
            }
        }

        let mut result = outcome?;
        result.repository = Some(RepositoryInfo {
            branch: cloned.branch,
            ..info
        });
        Ok(result)
    }

    async fn scan_local(
        &self,
        config: &ScanConfig,
        root: &Path,
        progress: Option<ScanProgressCallback>,
    ) -> Result<ScanResult> {
        let started = Instant::now();
        if !root.is_dir() {
            return Err(CodeGraphError::InvalidOperation(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        let project_id = config.project_id.as_str();
        let mut result = ScanResult::new(project_id);

        self.store
            .create_project(Project::new(project_id, config.project_name_for(root)))
            .await?;
        if config.clear_graph {
            info!("Clearing graph for project {}", project_id);
            self.store.clear_project(project_id).await?;
        }

        let files = {
            let root = root.to_path_buf();
            let collection = config.collection_config();
            tokio::task::spawn_blocking(move || {
                collect_source_files_with_config(&root, &collection)
            })
            .await
            .map_err(|e| CodeGraphError::InvalidOperation(format!("File walk failed: {}", e)))??
        };
        info!("Scanning {} files in {}", files.len(), root.display());

        let parsed = self.extract_files(config, root, files, progress).await;
        result.files_processed = parsed.len();

        let mut scanned_files = HashSet::new();
        let mut nodes: HashMap<String, CodeNode> = HashMap::new();
        let mut edges: HashMap<String, CodeEdge> = HashMap::new();
        for file in parsed {
            scanned_files.insert(file.file_path.clone());
            result.errors.extend(file.errors);
            for entity in file.entities {
                nodes
                    .entry(entity.id.clone())
                    .or_insert_with(|| entity.into_node(project_id));
            }
            for relationship in file.relationships {
                edges
                    .entry(relationship.id.clone())
                    .or_insert_with(|| relationship.into_edge(project_id));
            }
        }
        result.errors.sort_by(|a, b| (&a.file_path, a.line).cmp(&(&b.file_path, b.line)));

        let produced: HashSet<String> = nodes.keys().cloned().collect();
        let mut nodes: Vec<CodeNode> = nodes.into_values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<CodeEdge> = edges.into_values().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        result.entities_found = self.write_nodes(nodes, config.batch_size).await?;
        let (written, skipped) = self.write_edges(edges, config.batch_size).await?;
        result.relationships_found = written;
        result.relationships_skipped = skipped;

        if !config.clear_graph {
            result.stale_entities_removed = self
                .sweep_stale(project_id, &scanned_files, &produced)
                .await?;
        }

        if config.generate_embeddings {
            self.embed(project_id, &mut result).await;
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Scan of {} complete: {} files, {} entities, {} relationships ({} skipped), \
             {} errors in {}ms",
            project_id,
            result.files_processed,
            result.entities_found,
            result.relationships_found,
            result.relationships_skipped,
            result.errors.len(),
            result.processing_time_ms
        );
        Ok(result)
    }

    /// Parses every file on the blocking pool, at most `workers` at a time.
    async fn extract_files(
        &self,
        config: &ScanConfig,
        root: &Path,
        files: Vec<(PathBuf, u64)>,
        progress: Option<ScanProgressCallback>,
    ) -> Vec<ParseResult> {
        let total = files.len();
        let done = AtomicUsize::new(0);
        let packages = PackageRegistry::new();
        let project_id = config.project_id.as_str();

        stream::iter(files)
            .map(|(path, _size)| {
                let packages = packages.clone();
                let done = &done;
                let progress = progress.clone();
                async move {
                    let result = self.process_file(root, &path, project_id, packages).await;
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(callback) = &progress {
                        callback(finished, total);
                    }
                    result
                }
            })
            .buffer_unordered(config.workers.max(1))
            .collect::<Vec<_>>()
            .await
    }

    async fn process_file(
        &self,
        root: &Path,
        path: &Path,
        project_id: &str,
        packages: PackageRegistry,
    ) -> ParseResult {
        let relative = relative_path(root, path);
        let Some(language) = self.parser.detect_language(&relative) else {
            return ParseResult::failed(ParseError::new(
                format!("Unknown file type: {}", relative),
                0,
                &relative,
            ));
        };
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return ParseResult::failed(ParseError::new(e.to_string(), 0, &relative));
            }
        };

        let parser = self.parser.clone();
        let project_id = project_id.to_string();
        let file_path = relative.clone();
        let result = tokio::task::spawn_blocking(move || {
            parser.parse_source(&content, &file_path, language, &project_id, &packages)
        })
        .await
        .unwrap_or_else(|e| ParseResult::failed(ParseError::new(e.to_string(), 0, &relative)));
        debug!(
            "{}: {} entities, {} relationships",
            result.file_path,
            result.entities.len(),
            result.relationships.len()
        );
        result
    }

    async fn write_nodes(&self, nodes: Vec<CodeNode>, batch_size: usize) -> Result<usize> {
        let mut written = 0;
        for batch in nodes.chunks(batch_size.max(1)) {
            let outcome = self.store.add_nodes(batch.to_vec()).await?;
            if let Some((id, message)) = outcome.failed.first() {
                return Err(CodeGraphError::Graph(format!(
                    "Failed to store {} nodes (first: {}: {})",
                    outcome.failed.len(),
                    id,
                    message
                )));
            }
            written += outcome.written;
        }
        Ok(written)
    }

    /// Edges go in only after every node batch is stored. Edges to nodes
    /// outside the graph, such as library types, are skipped and counted.
    async fn write_edges(&self, edges: Vec<CodeEdge>, batch_size: usize) -> Result<(usize, usize)> {
        let mut written = 0;
        let mut skipped = 0;
        for batch in edges.chunks(batch_size.max(1)) {
            let outcome = self.store.add_edges(batch.to_vec()).await?;
            written += outcome.written;
            skipped += outcome.failed.len();
            for (id, reason) in &outcome.failed {
                debug!("Skipped relationship {}: {}", id, reason);
            }
        }
        Ok((written, skipped))
    }

    /// Deletes nodes attributed to a scanned file that this scan no longer
    /// produced.
    async fn sweep_stale(
        &self,
        project_id: &str,
        scanned_files: &HashSet<String>,
        produced: &HashSet<String>,
    ) -> Result<usize> {
        let stale: Vec<String> = self
            .store
            .get_all_nodes(project_id, usize::MAX)
            .await?
            .into_iter()
            .filter(|n| scanned_files.contains(&n.source_file) && !produced.contains(&n.id))
            .map(|n| n.id)
            .collect();
        let mut removed = 0;
        for id in stale {
            if self.store.delete_node(project_id, &id).await? {
                debug!("Removed stale node {}", id);
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} stale nodes from {}", removed, project_id);
        }
        Ok(removed)
    }

    async fn embed(&self, project_id: &str, result: &mut ScanResult) {
        if !self.search.embedding_service().is_enabled() {
            warn!("Embedding generation requested but no embedding provider is configured");
            return;
        }
        match self
            .search
            .update_embeddings(project_id, Some(&EMBEDDED_ENTITY_TYPES))
            .await
        {
            Ok(stats) => {
                result.embeddings_updated = stats.updated;
                result.embeddings_failed = stats.failed;
            }
            Err(e) => warn!("Embedding pass for {} failed: {}", project_id, e),
        }
    }

    /// Never fails; problems are reported in the result.
    pub async fn validate_remote_repository(
        &self,
        url: &str,
        token: Option<SecretString>,
    ) -> RemoteValidation {
        match self.git.validate_repository(url, token).await {
            Ok(repository) => RemoteValidation {
                valid: true,
                repository: Some(repository),
                error: None,
            },
            Err(e) => {
                debug!("Validation of {} failed: {}", url, e);
                RemoteValidation {
                    valid: false,
                    repository: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.git.cache_stats().await?)
    }

    pub async fn clear_cache(&self) -> Result<()> {
        Ok(self.git.clear_cache().await?)
    }
}

/// Path of `path` below `root` with `/` separators; `path` itself when it is
/// not below `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codegraph_core::{init_tracing, CodeGraphConfig, EntityType, GraphStore, Language};
use codegraph_graph::{InMemoryGraphStore, MetricsEngine};
use codegraph_scanner::{
    generate_scan_report, CodebaseScanner, RemoteScan, ScanConfig, ScanProgressCallback,
};
use codegraph_vector::{HybridSearchOptions, SemanticSearchParams};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "codegraph")]
#[command(
    about = "CodeGraph CLI - structural code graphs, metrics and semantic search",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to ~/.codegraph/config.toml and ./.codegraph.toml)
    #[arg(long, global = true, env = "CODEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Graph snapshot file
    #[arg(long, global = true, env = "CODEGRAPH_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a local directory or git repository into the graph
    Scan(ScanArgs),

    /// Check that a remote repository is reachable
    Validate {
        /// Repository URL
        url: String,

        /// Access token for private repositories
        #[arg(long, env = "CODEGRAPH_GIT_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Git cache management
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Object-oriented metrics and architectural issues
    #[command(subcommand)]
    Metrics(MetricsCommands),

    /// Semantic search over embedded entities
    Search {
        /// Project ID
        #[arg(short, long)]
        project: String,

        /// Natural-language or code query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum cosine similarity
        #[arg(long)]
        threshold: Option<f32>,

        /// Restrict to entity types (comma-separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<EntityType>,

        /// Add graph neighbours to each result
        #[arg(long)]
        hybrid: bool,
    },

    /// Nodes most similar to an existing node
    Similar {
        #[arg(short, long)]
        project: String,

        node_id: String,

        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Substring search over names and descriptions
    Find {
        #[arg(short, long)]
        project: String,

        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List scanned projects
    Projects,
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Local path or git URL
    source: String,

    /// Project ID (defaults to the directory or repository name)
    #[arg(short, long)]
    project: Option<String>,

    /// Human-readable project name
    #[arg(long)]
    name: Option<String>,

    /// Languages to scan (comma-separated; default all)
    #[arg(short, long, value_delimiter = ',')]
    languages: Vec<Language>,

    /// Additional exclude patterns
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Include test sources
    #[arg(long)]
    include_tests: bool,

    /// Branch to clone for remote sources
    #[arg(short, long)]
    branch: Option<String>,

    /// Always clone fresh instead of using the git cache
    #[arg(long)]
    no_cache: bool,

    /// Access token for private repositories
    #[arg(long, env = "CODEGRAPH_GIT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Drop existing nodes and edges of the project first
    #[arg(long)]
    clear: bool,

    /// Generate embeddings after the scan
    #[arg(long)]
    embeddings: bool,

    /// Parallel extraction workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the markdown scan report instead of the summary
    #[arg(long)]
    report: bool,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Remove every cached repository
    Clear,
}

#[derive(Subcommand)]
enum MetricsCommands {
    /// Project-wide summary including issues
    Summary {
        #[arg(short, long)]
        project: String,
    },

    /// CK metrics for one class
    Class {
        #[arg(short, long)]
        project: String,

        class_id: String,
    },

    /// Coupling and stability metrics for one package
    Package {
        #[arg(short, long)]
        project: String,

        package: String,
    },

    /// Architectural issues only
    Issues {
        #[arg(short, long)]
        project: String,
    },
}

struct AppContext {
    config: CodeGraphConfig,
    snapshot: PathBuf,
    store: Arc<InMemoryGraphStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CodeGraphConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_tracing(&config.logging);

    let snapshot = cli
        .snapshot
        .clone()
        .unwrap_or_else(|| config.graph.snapshot_path.clone());
    let store = InMemoryGraphStore::load_snapshot(&snapshot)
        .await
        .with_context(|| format!("Failed to load graph snapshot {}", snapshot.display()))?;
    let ctx = AppContext {
        config,
        snapshot,
        store: Arc::new(store),
    };

    match execute_command(&cli, &ctx).await {
        Ok(output) => {
            print_output(cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(cli: &Cli, ctx: &AppContext) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Scan(args) => execute_scan(args, ctx).await,
        Commands::Validate { url, token } => {
            let scanner = scanner(ctx);
            let validation = scanner
                .validate_remote_repository(url, token.clone().map(SecretString::from))
                .await;
            Ok(serde_json::to_value(validation)?)
        }
        Commands::Cache(cmd) => execute_cache_command(cmd, ctx).await,
        Commands::Metrics(cmd) => execute_metrics_command(cmd, ctx).await,
        Commands::Search {
            project,
            query,
            limit,
            threshold,
            types,
            hybrid,
        } => {
            let scanner = scanner(ctx);
            let params = SemanticSearchParams {
                limit: *limit,
                similarity_threshold: *threshold,
                node_types: (!types.is_empty()).then(|| types.clone()),
                ..SemanticSearchParams::new(project.as_str(), query.as_str())
            };
            let results = if *hybrid {
                scanner
                    .search()
                    .hybrid_search(&params, HybridSearchOptions::default())
                    .await
            } else {
                scanner.search().semantic_search(&params).await
            }
            .context("Semantic search failed")?;
            let rows: Vec<serde_json::Value> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.node.id,
                        "type": r.node.entity_type,
                        "source_file": r.node.source_file,
                        "score": r.similarity_score,
                        "content": r.matched_content,
                    })
                })
                .collect();
            Ok(serde_json::Value::Array(rows))
        }
        Commands::Similar {
            project,
            node_id,
            limit,
        } => {
            let scanner = scanner(ctx);
            let results = scanner
                .search()
                .get_similar_nodes(project, node_id, *limit)
                .await
                .context("Similarity lookup failed")?;
            let rows: Vec<serde_json::Value> = results
                .iter()
                .map(|r| serde_json::json!({"id": r.node.id, "score": r.similarity_score}))
                .collect();
            Ok(serde_json::Value::Array(rows))
        }
        Commands::Find {
            project,
            query,
            limit,
        } => {
            let nodes = ctx
                .store
                .search_nodes(project, query, limit.unwrap_or(ctx.config.graph.search_limit))
                .await?;
            let rows: Vec<serde_json::Value> = nodes
                .iter()
                .map(|n| {
                    serde_json::json!({
                        "id": n.id,
                        "type": n.entity_type,
                        "source_file": n.source_file,
                        "line": n.start_line,
                    })
                })
                .collect();
            Ok(serde_json::Value::Array(rows))
        }
        Commands::Projects => {
            let mut rows = Vec::new();
            for project in ctx.store.list_projects().await? {
                let stats = ctx.store.stats(&project.id).await?;
                rows.push(serde_json::json!({
                    "id": project.id,
                    "name": project.name,
                    "nodes": stats.node_count,
                    "edges": stats.edge_count,
                    "updated_at": project.updated_at.to_rfc3339(),
                }));
            }
            Ok(serde_json::Value::Array(rows))
        }
    }
}

fn scanner(ctx: &AppContext) -> CodebaseScanner {
    CodebaseScanner::from_config(&ctx.config, ctx.store.clone())
}

fn scan_config(args: &ScanArgs, config: &CodeGraphConfig) -> Result<ScanConfig> {
    let default_id = default_project_id(&args.source);
    let project_id = args.project.clone().unwrap_or(default_id);
    if project_id.is_empty() {
        bail!("Could not derive a project ID from {}; pass --project", args.source);
    }

    let mut scan = ScanConfig::from_source(&args.source, project_id).with_settings(&config.scan);
    scan.project_name = args.name.clone();
    scan.languages = args.languages.clone();
    scan.exclude_paths.extend(args.exclude.iter().cloned());
    scan.include_tests |= args.include_tests;
    scan.clear_graph = args.clear;
    scan.generate_embeddings |= args.embeddings;
    if let Some(workers) = args.workers {
        scan.workers = workers.max(1);
    }
    if let Some(remote) = scan.git.as_mut() {
        *remote = RemoteScan {
            branch: args.branch.clone(),
            use_cache: !args.no_cache,
            token: args.token.clone().map(SecretString::from),
            ..RemoteScan::new(remote.url.clone())
        };
    } else if args.branch.is_some() {
        bail!("--branch only applies to git sources");
    }
    Ok(scan)
}

/// Last path segment without a `.git` suffix.
fn default_project_id(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let last = trimmed
        .rsplit(|c| c == '/' || c == ':' || c == '\\')
        .next()
        .unwrap_or(trimmed);
    let last = last.split('#').next().unwrap_or(last);
    let last = last.trim_end_matches(".git");
    if last.is_empty() || last == "." {
        return std::env::current_dir()
            .ok()
            .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_default();
    }
    last.to_string()
}

async fn execute_scan(args: &ScanArgs, ctx: &AppContext) -> Result<serde_json::Value> {
    let scan = scan_config(args, &ctx.config)?;
    debug!("Scan configuration: {:?}", scan);
    let scanner = scanner(ctx);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let progress_bar = bar.clone();
    let progress: ScanProgressCallback = Arc::new(move |done, total| {
        progress_bar.set_length(total as u64);
        progress_bar.set_position(done as u64);
    });

    let result = scanner
        .scan_with_progress(&scan, Some(progress))
        .await
        .with_context(|| format!("Scan of {} failed", args.source));
    bar.finish_and_clear();
    let result = result?;

    ctx.store
        .save_snapshot(&ctx.snapshot)
        .await
        .with_context(|| format!("Failed to save graph snapshot {}", ctx.snapshot.display()))?;

    if args.report {
        println!("{}", generate_scan_report(&result));
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::json!({
        "project_id": result.project_id,
        "files_processed": result.files_processed,
        "entities_found": result.entities_found,
        "relationships_found": result.relationships_found,
        "relationships_skipped": result.relationships_skipped,
        "stale_entities_removed": result.stale_entities_removed,
        "embeddings_updated": result.embeddings_updated,
        "processing_time_ms": result.processing_time_ms,
        "errors": result.errors.len(),
    }))
}

async fn execute_cache_command(cmd: &CacheCommands, ctx: &AppContext) -> Result<serde_json::Value> {
    let scanner = scanner(ctx);
    match cmd {
        CacheCommands::Stats => {
            let stats = scanner
                .cache_stats()
                .await
                .context("Failed to read cache statistics")?;
            Ok(serde_json::to_value(stats)?)
        }
        CacheCommands::Clear => {
            scanner.clear_cache().await.context("Failed to clear cache")?;
            Ok(serde_json::json!({ "status": "cleared" }))
        }
    }
}

async fn execute_metrics_command(
    cmd: &MetricsCommands,
    ctx: &AppContext,
) -> Result<serde_json::Value> {
    let engine = MetricsEngine::new(ctx.store.clone());
    let value = match cmd {
        MetricsCommands::Summary { project } => {
            serde_json::to_value(engine.get_project_summary(project).await?)?
        }
        MetricsCommands::Class { project, class_id } => {
            serde_json::to_value(engine.get_class_metrics(project, class_id).await?)?
        }
        MetricsCommands::Package { project, package } => {
            serde_json::to_value(engine.get_package_metrics(project, package).await?)?
        }
        MetricsCommands::Issues { project } => {
            serde_json::to_value(engine.find_architectural_issues(project).await?)?
        }
    };
    Ok(value)
}

fn print_output(format: OutputFormat, value: &serde_json::Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b {
                            "true".green()
                        } else {
                            "false".red()
                        };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        serde_json::Value::Array(arr) if arr.is_empty() => {
            println!("{}", "No results".yellow());
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

use codegraph_core::ParseError;
use codegraph_git::RepositoryInfo;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Errors listed in full in the report; the rest are summarised.
const REPORT_ERROR_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub project_id: String,
    pub files_processed: usize,
    pub entities_found: usize,
    /// Edges written to the store.
    pub relationships_found: usize,
    /// Edges dropped because an endpoint is outside the graph.
    pub relationships_skipped: usize,
    /// Nodes removed because their file no longer declares them.
    pub stale_entities_removed: usize,
    pub embeddings_updated: usize,
    pub embeddings_failed: usize,
    pub processing_time_ms: u64,
    pub errors: Vec<ParseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
}

impl ScanResult {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outcome of checking a remote before scanning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Markdown summary of a scan.
pub fn generate_scan_report(result: &ScanResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Codebase Scan Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Project:** {}", result.project_id);
    if let Some(repo) = &result.repository {
        let _ = writeln!(
            out,
            "**Repository:** {} ({}, branch `{}`)",
            repo.full_name, repo.url, repo.branch
        );
    }
    let _ = writeln!(
        out,
        "**Processing time:** {:.2}s",
        result.processing_time_ms as f64 / 1000.0
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Count |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Files processed | {} |", result.files_processed);
    let _ = writeln!(out, "| Entities found | {} |", result.entities_found);
    let _ = writeln!(out, "| Relationships found | {} |", result.relationships_found);
    let _ = writeln!(out, "| Relationships skipped | {} |", result.relationships_skipped);
    if result.stale_entities_removed > 0 {
        let _ = writeln!(out, "| Stale entities removed | {} |", result.stale_entities_removed);
    }
    if result.embeddings_updated + result.embeddings_failed > 0 {
        let _ = writeln!(out, "| Embeddings updated | {} |", result.embeddings_updated);
        let _ = writeln!(out, "| Embeddings failed | {} |", result.embeddings_failed);
    }
    let _ = writeln!(out, "| Errors | {} |", result.errors.len());

    if result.has_errors() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        let _ = writeln!(out);
        for error in result.errors.iter().take(REPORT_ERROR_LIMIT) {
            let _ = writeln!(
                out,
                "- `{}` line {}: {}",
                error.file_path, error.line, error.message
            );
        }
        if result.errors.len() > REPORT_ERROR_LIMIT {
            let _ = writeln!(
                out,
                "- ... and {} more",
                result.errors.len() - REPORT_ERROR_LIMIT
            );
        }
    }
    out
}

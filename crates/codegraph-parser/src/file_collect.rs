use crate::LanguageRegistry;
use codegraph_core::{CodeGraphError, Language, Result};
use ignore::{overrides::OverrideBuilder, WalkBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directories and generated files never worth parsing.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "target",
    ".git",
    "coverage",
    "__pycache__",
    "*.d.ts",
    "*.min.js",
];

/// Test sources skipped unless tests are requested.
pub const TEST_EXCLUDES: &[&str] = &[
    "*.test.*",
    "*.spec.*",
    "test",
    "tests",
    "test_*.py",
    "*_test.py",
    "src/test",
];

/// Configuration for file collection
#[derive(Debug, Clone)]
pub struct FileCollectionConfig {
    /// Empty means every supported language.
    pub languages: Vec<Language>,
    pub include_tests: bool,
    pub exclude_patterns: Vec<String>,
    pub max_depth: Option<usize>,
}

impl Default for FileCollectionConfig {
    fn default() -> Self {
        Self {
            languages: vec![],
            include_tests: false,
            exclude_patterns: vec![],
            max_depth: None,
        }
    }
}

/// Turns an exclude entry into ignore-override globs. Bare names match a
/// file or directory anywhere in the tree; entries with a slash are rooted.
fn exclude_globs(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim().trim_end_matches('/');
    if pattern.is_empty() {
        return Vec::new();
    }
    let base = if pattern.contains('/') || pattern.starts_with("**") {
        pattern.to_string()
    } else {
        format!("**/{}", pattern)
    };
    vec![format!("!{}", base), format!("!{}/**", base)]
}

/// Walks `dir` and returns the supported source files with their sizes,
/// sorted by path.
pub fn collect_source_files_with_config(
    dir: &Path,
    config: &FileCollectionConfig,
) -> Result<Vec<(PathBuf, u64)>> {
    info!("Collecting source files from: {:?}", dir);
    debug!(
        "Collection config: languages={:?}, include_tests={}, max_depth={:?}",
        config.languages, config.include_tests, config.max_depth
    );

    let mut ovr = OverrideBuilder::new(dir);
    let mut patterns: Vec<&str> = DEFAULT_EXCLUDES.to_vec();
    if !config.include_tests {
        patterns.extend(TEST_EXCLUDES);
    }
    patterns.extend(config.exclude_patterns.iter().map(String::as_str));

    for pattern in patterns {
        for glob in exclude_globs(pattern) {
            ovr.add(&glob).map_err(|e| {
                CodeGraphError::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }
    }

    let overrides = ovr
        .build()
        .map_err(|e| CodeGraphError::Io(std::io::Error::other(e)))?;

    let mut walker_builder = WalkBuilder::new(dir);
    walker_builder
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .overrides(overrides)
        .max_depth(config.max_depth);

    let registry = LanguageRegistry::new();
    let supported_extensions = supported_extensions(&registry, &config.languages);
    debug!("Supported extensions: {:?}", supported_extensions);

    let mut paths = Vec::new();
    let mut total_files = 0;

    for dent in walker_builder.build() {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };

        let path = dent.path();
        if !path.is_file() {
            continue;
        }
        total_files += 1;

        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if supported_extensions.contains(ext) => {}
            _ => continue,
        }

        let size = dent.metadata().map(|m| m.len()).unwrap_or(0);
        paths.push((path.to_path_buf(), size));
    }

    paths.sort();
    info!(
        "File collection complete: {} files found, {} passed filters",
        total_files,
        paths.len()
    );

    if paths.is_empty() && total_files > 0 {
        warn!("No files passed language filters. Check the configured languages.");
    }

    Ok(paths)
}

fn supported_extensions(
    registry: &LanguageRegistry,
    languages: &[Language],
) -> HashSet<&'static str> {
    if languages.is_empty() {
        return registry.extensions().into_iter().collect();
    }
    languages
        .iter()
        .filter_map(|language| registry.get_config(language))
        .flat_map(|config| config.file_extensions.iter().copied())
        .collect()
}

pub fn collect_source_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    collect_source_files_with_config(dir, &FileCollectionConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn relative(root: &Path, files: &[(PathBuf, u64)]) -> Vec<String> {
        files
            .iter()
            .map(|(p, _)| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "src/main/java/app/Service.java");
        touch(root, "src/test/java/app/ServiceTest.java");
        touch(root, "pkg/users.py");
        touch(root, "pkg/test_users.py");
        touch(root, "web/app.ts");
        touch(root, "web/app.spec.ts");
        touch(root, "web/types.d.ts");
        touch(root, "web/vendor.min.js");
        touch(root, "node_modules/lib/index.js");
        touch(root, "README.md");
        dir
    }

    #[test]
    fn default_collection_skips_tests_and_generated_files() {
        let dir = fixture();
        let files = collect_source_files(dir.path()).unwrap();
        assert_eq!(
            relative(dir.path(), &files),
            vec!["pkg/users.py", "src/main/java/app/Service.java", "web/app.ts"]
        );
    }

    #[test]
    fn tests_and_language_filter() {
        let dir = fixture();
        let config = FileCollectionConfig {
            languages: vec![Language::Python],
            include_tests: true,
            ..Default::default()
        };
        let files = collect_source_files_with_config(dir.path(), &config).unwrap();
        assert_eq!(relative(dir.path(), &files), vec!["pkg/test_users.py", "pkg/users.py"]);
    }

    #[test]
    fn custom_excludes_apply() {
        let dir = fixture();
        let config = FileCollectionConfig {
            exclude_patterns: vec!["web".into()],
            ..Default::default()
        };
        let files = collect_source_files_with_config(dir.path(), &config).unwrap();
        assert_eq!(
            relative(dir.path(), &files),
            vec!["pkg/users.py", "src/main/java/app/Service.java"]
        );
    }
}

use crate::builder::{EntityBuilder, PackageRegistry, ParseResult};
use crate::ir::FileExtraction;
use crate::languages::extractor_utils::first_error_line;
use crate::languages::{JavaExtractor, LanguageExtractor, PythonExtractor, TypeScriptExtractor};
use crate::LanguageRegistry;
use codegraph_core::{CodeGraphError, Language, ParseError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// Parses files with tree-sitter and turns them into graph facts.
///
/// Cheap to clone; parsers are created per call because `tree_sitter::Parser`
/// is not `Sync`.
#[derive(Clone)]
pub struct TreeSitterParser {
    registry: Arc<LanguageRegistry>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(LanguageRegistry::new()),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        vec![
            Language::Java,
            Language::Python,
            Language::TypeScript,
            Language::JavaScript,
        ]
    }

    pub fn detect_language(&self, file_path: &str) -> Option<Language> {
        self.registry.detect_language(file_path)
    }

    /// Runs the language extractor over `content`.
    ///
    /// Whitespace-only input yields an empty extraction. Syntax errors are
    /// recorded on the extraction; tree-sitter's recovered tree is still used.
    pub fn extract(
        &self,
        content: &str,
        file_path: &str,
        language: Language,
    ) -> Result<FileExtraction> {
        if content.trim().is_empty() {
            return Ok(FileExtraction::new(language, file_path, ""));
        }

        let mut parser = self
            .registry
            .create_parser_for_path(&language, file_path)
            .ok_or_else(|| CodeGraphError::Parse(format!("Unsupported language: {:?}", language)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| CodeGraphError::Parse(format!("Failed to parse file: {}", file_path)))?;

        let mut extraction = match language {
            Language::Java => JavaExtractor::extract(&tree, content, file_path),
            Language::Python => PythonExtractor::extract(&tree, content, file_path),
            Language::TypeScript | Language::JavaScript => {
                TypeScriptExtractor::extract_with_language(&tree, content, file_path, language)
            }
        };

        if let Some(line) = first_error_line(&tree.root_node()) {
            debug!("Syntax error in {} at line {}", file_path, line);
            extraction
                .errors
                .push(ParseError::new("syntax error", line, file_path));
        }
        Ok(extraction)
    }

    /// Extracts and builds entities for one file's content.
    ///
    /// Never fails: problems become `ParseError`s on the result so one bad
    /// file cannot abort a scan.
    pub fn parse_source(
        &self,
        content: &str,
        file_path: &str,
        language: Language,
        project_id: &str,
        packages: &PackageRegistry,
    ) -> ParseResult {
        if content.trim().is_empty() {
            return ParseResult::empty(file_path);
        }
        match self.extract(content, file_path, language) {
            Ok(extraction) => EntityBuilder::new(&extraction, project_id, packages).build(),
            Err(e) => ParseResult::failed(ParseError::new(e.to_string(), 0, file_path)),
        }
    }

    /// Reads and parses a file on the blocking pool.
    pub async fn parse_file(
        &self,
        path: &Path,
        project_id: &str,
        packages: &PackageRegistry,
    ) -> ParseResult {
        let file_path = path.to_string_lossy().to_string();
        let Some(language) = self.detect_language(&file_path) else {
            return ParseResult::failed(ParseError::new(
                format!("Unknown file type: {}", file_path),
                0,
                &file_path,
            ));
        };

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", file_path, e);
                return ParseResult::failed(ParseError::new(e.to_string(), 0, &file_path));
            }
        };

        let parser = self.clone();
        let project_id = project_id.to_string();
        let packages = packages.clone();
        let path_for_task = file_path.clone();
        tokio::task::spawn_blocking(move || {
            parser.parse_source(&content, &path_for_task, language, &project_id, &packages)
        })
        .await
        .unwrap_or_else(|e| ParseResult::failed(ParseError::new(e.to_string(), 0, &file_path)))
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::RelationshipType;

    #[test]
    fn whitespace_only_file_yields_empty_result() {
        let parser = TreeSitterParser::new();
        let packages = PackageRegistry::new();
        let result = parser.parse_source("  \n\t\n", "Empty.java", Language::Java, "p", &packages);
        assert!(result.entities.is_empty());
        assert!(result.relationships.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn syntax_errors_are_reported_not_raised() {
        let parser = TreeSitterParser::new();
        let packages = PackageRegistry::new();
        let source = "package app;\n\npublic class Broken {\n    void run( {\n}\n";
        let result =
            parser.parse_source(source, "src/app/Broken.java", Language::Java, "p", &packages);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].file_path, "src/app/Broken.java");
        assert!(result.errors[0].line >= 1);
    }

    #[test]
    fn example_inheritance_scenario() {
        let parser = TreeSitterParser::new();
        let packages = PackageRegistry::new();
        let source = r#"package app;

import pkg.base.Bar;

public class Foo extends Bar implements Baz {
    public void run() {}
}
"#;
        let result =
            parser.parse_source(source, "src/app/Foo.java", Language::Java, "p", &packages);
        assert!(result.errors.is_empty());
        let edge = |t: RelationshipType, target: &str| {
            result
                .relationships
                .iter()
                .any(|r| r.rel_type == t && r.source == "app.Foo" && r.target == target)
        };
        assert!(edge(RelationshipType::Extends, "pkg.base.Bar"));
        assert!(edge(RelationshipType::Implements, "app.Baz"));
        assert!(edge(RelationshipType::Contains, "app.Foo.run"));
    }

    #[tokio::test]
    async fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapes.py");
        std::fs::write(&path, "class Circle:\n    def area(self):\n        return 3\n").unwrap();

        let parser = TreeSitterParser::new();
        let packages = PackageRegistry::new();
        let result = parser.parse_file(&path, "p", &packages).await;
        assert!(result.errors.is_empty());
        assert!(result.entities.iter().any(|e| e.id == "shapes.Circle.area"));
        assert!(packages.contains("p", "shapes"));
    }

    #[tokio::test]
    async fn unknown_extension_is_a_parse_error() {
        let parser = TreeSitterParser::new();
        let result = parser
            .parse_file(Path::new("notes.txt"), "p", &PackageRegistry::new())
            .await;
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("Unknown file type"));
    }
}

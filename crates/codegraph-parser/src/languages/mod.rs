// ABOUTME: Language extractor modules and shared infrastructure
// ABOUTME: Provides unified extraction interface for all supported languages

pub mod extractor_utils;
pub mod java;
pub mod python;
pub mod typescript;

use crate::ir::FileExtraction;
use codegraph_core::Language;
use tree_sitter::Tree;

/// Trait for language-specific AST extractors
///
/// All language extractors walk a parsed tree once and produce the
/// language-neutral [`FileExtraction`] the builder consumes.
pub trait LanguageExtractor {
    /// Extract declarations, imports and call sites in a single AST traversal
    fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction;

    /// Language identifier
    fn language() -> Language;
}

// Re-export extractors for convenience
pub use java::JavaExtractor;
pub use python::PythonExtractor;
pub use typescript::{JavaScriptExtractor, TypeScriptExtractor};

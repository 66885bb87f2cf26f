// ABOUTME: Defines the supported programming languages available to the parser pipeline.
// ABOUTME: Maps file extensions to Tree-sitter grammars and builds configured parsers.
use codegraph_core::Language;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Parser;

pub struct LanguageConfig {
    pub language: tree_sitter::Language,
    pub file_extensions: Vec<&'static str>,
}

pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
    tsx: tree_sitter::Language,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        configs.insert(
            Language::Java,
            LanguageConfig {
                language: tree_sitter_java::LANGUAGE.into(),
                file_extensions: vec!["java"],
            },
        );

        configs.insert(
            Language::Python,
            LanguageConfig {
                language: tree_sitter_python::LANGUAGE.into(),
                file_extensions: vec!["py", "pyi"],
            },
        );

        configs.insert(
            Language::TypeScript,
            LanguageConfig {
                language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                file_extensions: vec!["ts", "tsx"],
            },
        );

        configs.insert(
            Language::JavaScript,
            LanguageConfig {
                language: tree_sitter_javascript::LANGUAGE.into(),
                file_extensions: vec!["js", "jsx", "mjs", "cjs"],
            },
        );

        Self {
            configs,
            tsx: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    pub fn detect_language(&self, file_path: &str) -> Option<Language> {
        let extension = Path::new(file_path).extension()?.to_str()?;

        for (lang, config) in &self.configs {
            if config.file_extensions.contains(&extension) {
                return Some(*lang);
            }
        }

        None
    }

    /// Every extension a scan should pick up.
    pub fn extensions(&self) -> Vec<&'static str> {
        let mut all: Vec<&'static str> = self
            .configs
            .values()
            .flat_map(|c| c.file_extensions.iter().copied())
            .collect();
        all.sort_unstable();
        all
    }

    pub fn get_config(&self, language: &Language) -> Option<&LanguageConfig> {
        self.configs.get(language)
    }

    pub fn create_parser(&self, language: &Language) -> Option<Parser> {
        let config = self.get_config(language)?;
        let mut parser = Parser::new();
        parser.set_language(&config.language).ok()?;
        Some(parser)
    }

    /// Like [`create_parser`](Self::create_parser) but picks the TSX grammar for `.tsx` files.
    pub fn create_parser_for_path(&self, language: &Language, file_path: &str) -> Option<Parser> {
        let is_tsx = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "tsx");
        if *language == Language::TypeScript && is_tsx {
            let mut parser = Parser::new();
            parser.set_language(&self.tsx).ok()?;
            return Some(parser);
        }
        self.create_parser(language)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

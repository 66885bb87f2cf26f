// ABOUTME: Java language AST extractor for code intelligence
// ABOUTME: Extracts packages, types, methods, fields, imports, annotations and call sites

use super::extractor_utils::{
    child_by_kind, end_line, named_children, node_text, preceding_doc_comment, start_line,
};
use crate::annotations::scan_annotations;
use crate::calls::scan_calls;
use crate::ir::{FieldDecl, FileExtraction, FunctionDecl, ImportInfo, TypeDecl, TypeKind};
use codegraph_core::{Language, ParameterInfo};
use tree_sitter::{Node, Tree, TreeCursor};

/// Java AST extractor.
///
/// Extracts:
/// - package declaration (or a package derived from the source path)
/// - single and wildcard imports
/// - classes, records, interfaces, enums with their supertypes
/// - methods, constructors (named `<init>`) and fields
/// - annotations with framework tags, Javadoc summaries, call sites
///
/// Members are owned by the innermost type whose line range covers them;
/// members outside any type are dropped.
pub struct JavaExtractor;

impl JavaExtractor {
    pub fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        let mut collector = JavaCollector::new(content, file_path);
        let mut cursor = tree.walk();
        collector.walk(&mut cursor);
        collector.finish()
    }
}

impl super::LanguageExtractor for JavaExtractor {
    fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        JavaExtractor::extract(tree, content, file_path)
    }

    fn language() -> Language {
        Language::Java
    }
}

/// Package implied by the directory layout: the segments after
/// `src/main/java`, `src/test/java` or `src`, else `default`.
pub fn package_from_path(file_path: &str) -> String {
    let normalized = file_path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let dirs = &segments[..segments.len().saturating_sub(1)];
    let markers: [&[&str]; 3] = [&["src", "main", "java"], &["src", "test", "java"], &["src"]];
    for marker in markers {
        if let Some(pos) = dirs.windows(marker.len()).position(|w| w == marker) {
            let rest = &dirs[pos + marker.len()..];
            if rest.is_empty() {
                break;
            }
            return rest.join(".");
        }
    }
    "default".to_string()
}

struct JavaCollector<'a> {
    content: &'a str,
    lines: Vec<&'a str>,
    file_path: &'a str,
    package: Option<String>,
    out: FileExtraction,
}

impl<'a> JavaCollector<'a> {
    fn new(content: &'a str, file_path: &'a str) -> Self {
        Self {
            content,
            lines: content.lines().collect(),
            file_path,
            package: None,
            out: FileExtraction::new(Language::Java, file_path, String::new()),
        }
    }

    fn walk(&mut self, cursor: &mut TreeCursor) {
        let node = cursor.node();

        match node.kind() {
            "package_declaration" => {
                if let Some(name) = child_by_kind(&node, "scoped_identifier")
                    .or_else(|| child_by_kind(&node, "identifier"))
                {
                    self.package = Some(self.text(&name));
                }
                return;
            }
            "import_declaration" => {
                self.visit_import(&node);
                return;
            }
            "class_declaration" | "record_declaration" => self.visit_type(&node, TypeKind::Class),
            "interface_declaration" => self.visit_type(&node, TypeKind::Interface),
            "enum_declaration" => self.visit_type(&node, TypeKind::Enum),
            "method_declaration"
            | "constructor_declaration"
            | "compact_constructor_declaration" => {
                self.visit_method(&node);
                return;
            }
            "field_declaration" | "constant_declaration" => {
                self.visit_field(&node);
                return;
            }
            _ => {}
        }

        // Recursively walk children
        if cursor.goto_first_child() {
            loop {
                self.walk(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    fn visit_import(&mut self, node: &Node) {
        let Some(path) = child_by_kind(node, "scoped_identifier")
            .or_else(|| child_by_kind(node, "identifier"))
            .map(|n| self.text(&n))
        else {
            return;
        };
        let is_wildcard = child_by_kind(node, "asterisk").is_some();
        let items = if is_wildcard {
            Vec::new()
        } else {
            path.rsplit('.').next().map(|s| vec![s.to_string()]).unwrap_or_default()
        };
        self.out.imports.push(ImportInfo {
            module: path,
            items,
            alias: None,
            is_wildcard,
            line: start_line(node),
        });
    }

    fn visit_type(&mut self, node: &Node, kind: TypeKind) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(&name_node);
        let mut decl = TypeDecl::new(name.clone(), kind, start_line(node), end_line(node));
        decl.modifiers = self.modifiers(node);
        decl.annotations =
            scan_annotations(&self.lines, start_line(&name_node), &name, Language::Java);
        decl.description = preceding_doc_comment(node, self.content);

        if let Some(superclass) = node.child_by_field_name("superclass") {
            decl.extends.extend(
                named_children(&superclass)
                    .iter()
                    .map(|t| self.text(t)),
            );
        }
        if let Some(extends) = child_by_kind(node, "extends_interfaces") {
            decl.extends.extend(self.type_list(&extends));
        }
        if let Some(interfaces) = node.child_by_field_name("interfaces") {
            decl.implements.extend(self.type_list(&interfaces));
        }
        self.out.push_type(decl);
    }

    fn visit_method(&mut self, node: &Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let source_name = self.text(&name_node);
        let is_constructor = node.kind() != "method_declaration";
        let name = if is_constructor { "<init>".to_string() } else { source_name.clone() };

        let mut decl = FunctionDecl::new(name, start_line(node), end_line(node));
        decl.is_constructor = is_constructor;
        decl.modifiers = self.modifiers(node);
        decl.annotations =
            scan_annotations(&self.lines, start_line(&name_node), &source_name, Language::Java);
        decl.description = preceding_doc_comment(node, self.content);
        if !is_constructor {
            decl.return_type = node.child_by_field_name("type").map(|t| self.text(&t));
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            decl.parameters = self.parameters(&params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            decl.calls = scan_calls(
                node_text(&body, self.content),
                start_line(&body),
                &source_name,
                Language::Java,
            );
        }
        self.out.functions.push(decl);
    }

    fn visit_field(&mut self, node: &Node) {
        let type_name = node.child_by_field_name("type").map(|t| self.text(&t));
        let modifiers = self.modifiers(node);
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(&name_node);
            let mut field = FieldDecl::new(name.clone(), start_line(node), end_line(node));
            field.type_name = type_name.clone();
            field.modifiers = modifiers.clone();
            field.annotations =
                scan_annotations(&self.lines, start_line(&name_node), &name, Language::Java);
            self.out.fields.push(field);
        }
    }

    fn parameters(&self, params: &Node) -> Vec<ParameterInfo> {
        let mut result = Vec::new();
        for param in named_children(params) {
            match param.kind() {
                "formal_parameter" => {
                    if let Some(name) = param.child_by_field_name("name") {
                        result.push(ParameterInfo {
                            name: self.text(&name),
                            type_name: param.child_by_field_name("type").map(|t| self.text(&t)),
                            description: None,
                        });
                    }
                }
                "spread_parameter" => {
                    let children = named_children(&param);
                    let type_name = children
                        .iter()
                        .find(|c| c.kind() != "modifiers" && c.kind() != "variable_declarator")
                        .map(|t| format!("{}...", self.text(t)));
                    let name = child_by_kind(&param, "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"))
                        .map(|n| self.text(&n));
                    if let Some(name) = name {
                        result.push(ParameterInfo {
                            name,
                            type_name,
                            description: None,
                        });
                    }
                }
                _ => {}
            }
        }
        result
    }

    /// Keyword modifiers only; annotations are handled by the annotation scanner.
    fn modifiers(&self, node: &Node) -> Vec<String> {
        let Some(modifiers) = child_by_kind(node, "modifiers") else {
            return Vec::new();
        };
        let mut cursor = modifiers.walk();
        modifiers
            .children(&mut cursor)
            .filter(|c| !c.kind().ends_with("annotation"))
            .map(|c| self.text(&c))
            .collect()
    }

    fn type_list(&self, node: &Node) -> Vec<String> {
        match child_by_kind(node, "type_list") {
            Some(list) => named_children(&list).iter().map(|t| self.text(t)).collect(),
            None => Vec::new(),
        }
    }

    fn finish(mut self) -> FileExtraction {
        self.out.namespace = self
            .package
            .take()
            .unwrap_or_else(|| package_from_path(self.file_path));

        let spans: Vec<(String, u32, u32)> = self
            .out
            .types()
            .map(|t| (t.name.clone(), t.start_line, t.end_line))
            .collect();
        let innermost = |line: u32| -> Option<String> {
            spans
                .iter()
                .filter(|(_, start, end)| *start <= line && line <= *end)
                .min_by_key(|(_, start, end)| end - start)
                .map(|(name, _, _)| name.clone())
        };

        let functions = std::mem::take(&mut self.out.functions);
        self.out.functions = functions
            .into_iter()
            .filter_map(|mut f| {
                f.owner = Some(innermost(f.start_line)?);
                Some(f)
            })
            .collect();
        let fields = std::mem::take(&mut self.out.fields);
        self.out.fields = fields
            .into_iter()
            .filter_map(|mut f| {
                f.owner = Some(innermost(f.start_line)?);
                Some(f)
            })
            .collect();
        self.out
    }

    fn text(&self, node: &Node) -> String {
        node_text(node, self.content).to_string()
    }
}

// ABOUTME: TypeScript/JavaScript extractor shared by both grammars
// ABOUTME: Extracts modules, classes, interfaces, enums, functions, fields, imports and calls

use super::extractor_utils::{
    child_by_kind, end_line, file_stem, named_children, node_text, parent_dir_name,
    preceding_doc_comment, start_line,
};
use crate::annotations::scan_annotations;
use crate::calls::scan_calls;
use crate::ir::{FieldDecl, FileExtraction, FunctionDecl, ImportInfo, TypeDecl, TypeKind};
use crate::text_processor::strip_quotes;
use codegraph_core::{Language, ParameterInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::{Node, Tree};

static EXTENDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bextends\s+([\w$.]+)").unwrap());
static IMPLEMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bimplements\s+(.+)$").unwrap());
static INTERFACE_EXTENDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\bextends\s+(.+)$").unwrap());

const MEMBER_MODIFIERS: &[&str] = &[
    "static", "async", "readonly", "abstract", "get", "set", "declare", "override",
];

/// TypeScript extractor; also drives JavaScript through [`JavaScriptExtractor`].
pub struct TypeScriptExtractor;

impl TypeScriptExtractor {
    /// Extract declarations in a single pass over the top-level statements
    pub fn extract_with_language(
        tree: &Tree,
        content: &str,
        file_path: &str,
        language: Language,
    ) -> FileExtraction {
        let mut collector = TypeScriptCollector::new(content, file_path, language);
        collector.visit_program(&tree.root_node());
        collector.out
    }
}

impl super::LanguageExtractor for TypeScriptExtractor {
    fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        TypeScriptExtractor::extract_with_language(tree, content, file_path, Language::TypeScript)
    }

    fn language() -> Language {
        Language::TypeScript
    }
}

pub struct JavaScriptExtractor;

impl super::LanguageExtractor for JavaScriptExtractor {
    fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        TypeScriptExtractor::extract_with_language(tree, content, file_path, Language::JavaScript)
    }

    fn language() -> Language {
        Language::JavaScript
    }
}

/// Module name for a script file: its stem, or the directory for `index` files.
pub fn module_name(file_path: &str) -> String {
    let stem = file_stem(file_path);
    if stem == "index" {
        if let Some(dir) = parent_dir_name(file_path) {
            return dir;
        }
    }
    stem
}

/// Relative specifiers (`./models/user`) map onto module names; packages stay as written.
fn import_target(specifier: &str) -> String {
    if !specifier.starts_with('.') {
        return specifier.to_string();
    }
    let segments: Vec<&str> = specifier
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let Some(last) = segments.last() else {
        return specifier.to_string();
    };
    let stem = match last.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs") => stem,
        _ => last,
    };
    if stem == "index" && segments.len() > 1 {
        return segments[segments.len() - 2].to_string();
    }
    stem.to_string()
}

/// Splits `A, B<C, D>` on commas outside angle brackets.
fn split_type_list(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '<' | '(' | '{' | '[' => depth += 1,
            '>' | ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

fn annotation_text(node: &Node, content: &str) -> Option<String> {
    let text = node_text(node, content).trim_start_matches(':').trim();
    (!text.is_empty()).then(|| text.to_string())
}

struct TypeScriptCollector<'a> {
    content: &'a str,
    lines: Vec<&'a str>,
    language: Language,
    out: FileExtraction,
}

impl<'a> TypeScriptCollector<'a> {
    fn new(content: &'a str, file_path: &'a str, language: Language) -> Self {
        Self {
            content,
            lines: content.lines().collect(),
            language,
            out: FileExtraction::new(language, file_path, module_name(file_path)),
        }
    }

    fn visit_program(&mut self, root: &Node) {
        for child in named_children(root) {
            self.visit_statement(&child, false);
        }
    }

    fn visit_statement(&mut self, node: &Node, exported: bool) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "export_statement" => {
                for child in named_children(node) {
                    self.visit_statement(&child, true);
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                self.visit_class(node, exported)
            }
            "interface_declaration" => self.visit_interface(node, exported),
            "enum_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(&name_node);
                    let (start, end) = (start_line(node), end_line(node));
                    let mut decl = TypeDecl::new(name.clone(), TypeKind::Enum, start, end);
                    decl.description = self.doc(node);
                    decl.annotations = self.annotations(&name_node, &name);
                    if exported {
                        decl.modifiers.push("export".to_string());
                    }
                    self.out.push_type(decl);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(&name_node);
                    let mut decl = self.function(node, &name, &name_node);
                    decl.description = self.doc(node);
                    if exported {
                        decl.modifiers.push("export".to_string());
                    }
                    self.out.functions.push(decl);
                }
            }
            "lexical_declaration" | "variable_declaration" => self.visit_variables(node, exported),
            _ => {}
        }
    }

    fn visit_import(&mut self, node: &Node) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let module = import_target(strip_quotes(node_text(&source, self.content)));
        let line = start_line(node);
        let mut items = Vec::new();

        if let Some(clause) = child_by_kind(node, "import_clause") {
            for part in named_children(&clause) {
                match part.kind() {
                    "identifier" => items.push(self.text(&part)),
                    "namespace_import" => {
                        if let Some(alias) = child_by_kind(&part, "identifier") {
                            self.out.imports.push(ImportInfo {
                                module: module.clone(),
                                items: Vec::new(),
                                alias: Some(self.text(&alias)),
                                is_wildcard: true,
                                line,
                            });
                        }
                    }
                    "named_imports" => {
                        for spec in named_children(&part) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let Some(name) = spec.child_by_field_name("name") else {
                                continue;
                            };
                            let name = self.text(&name);
                            match spec.child_by_field_name("alias") {
                                Some(alias) => self.out.imports.push(ImportInfo {
                                    module: format!("{}.{}", module, name),
                                    items: Vec::new(),
                                    alias: Some(self.text(&alias)),
                                    is_wildcard: false,
                                    line,
                                }),
                                None => items.push(name),
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let already = self.out.imports.iter().any(|i| i.line == line && i.module == module);
        if !items.is_empty() || !already {
            self.out.imports.push(ImportInfo {
                module,
                items,
                alias: None,
                is_wildcard: false,
                line,
            });
        }
    }

    fn visit_class(&mut self, node: &Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(&name_node);
        let mut decl =
            TypeDecl::new(name.clone(), TypeKind::Class, start_line(node), end_line(node));
        decl.description = self.doc(node);
        decl.annotations = self.annotations(&name_node, &name);
        if exported {
            decl.modifiers.push("export".to_string());
        }
        if node.kind() == "abstract_class_declaration" {
            decl.modifiers.push("abstract".to_string());
        }
        if let Some(heritage) = child_by_kind(node, "class_heritage") {
            let text = node_text(&heritage, self.content).replace('\n', " ");
            if let Some(caps) = EXTENDS.captures(&text) {
                decl.extends.push(caps[1].to_string());
            }
            if let Some(caps) = IMPLEMENTS.captures(&text) {
                decl.implements = split_type_list(&caps[1]);
            }
        }
        self.out.push_type(decl);

        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(&body) {
                self.visit_member(&member, &name);
            }
        }
    }

    fn visit_interface(&mut self, node: &Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(&name_node);
        let mut decl =
            TypeDecl::new(name.clone(), TypeKind::Interface, start_line(node), end_line(node));
        decl.description = self.doc(node);
        if exported {
            decl.modifiers.push("export".to_string());
        }
        let body = node.child_by_field_name("body");
        let header_end = body.map(|b| b.start_byte()).unwrap_or(node.end_byte());
        let header = &self.content[name_node.end_byte()..header_end];
        if let Some(caps) = INTERFACE_EXTENDS.captures(header.trim()) {
            decl.extends = split_type_list(&caps[1]);
        }
        self.out.push_type(decl);

        if let Some(body) = body {
            for member in named_children(&body) {
                if member.kind() == "method_signature" {
                    self.visit_member(&member, &name);
                }
            }
        }
    }

    fn visit_member(&mut self, member: &Node, owner: &str) {
        match member.kind() {
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                let Some(name_node) = member.child_by_field_name("name") else {
                    return;
                };
                let name = self.text(&name_node);
                let mut decl = self.function(member, &name, &name_node);
                decl.owner = Some(owner.to_string());
                decl.is_constructor = name == "constructor";
                decl.modifiers = self.member_modifiers(member, &name_node);
                if member.kind() == "abstract_method_signature"
                    && !decl.modifiers.iter().any(|m| m == "abstract")
                {
                    decl.modifiers.push("abstract".to_string());
                }
                decl.description = self.doc(member);
                if decl.is_constructor {
                    self.parameter_properties(member, owner);
                }
                self.out.functions.push(decl);
            }
            "public_field_definition" | "field_definition" => {
                let name_node = member
                    .child_by_field_name("name")
                    .or_else(|| member.child_by_field_name("property"));
                let Some(name_node) = name_node else {
                    return;
                };
                let name = self.text(&name_node);
                let mut field = FieldDecl::new(name.clone(), start_line(member), end_line(member));
                field.owner = Some(owner.to_string());
                field.type_name = member
                    .child_by_field_name("type")
                    .and_then(|t| annotation_text(&t, self.content));
                field.modifiers = self.member_modifiers(member, &name_node);
                field.annotations = self.annotations(&name_node, &name);
                self.out.fields.push(field);
            }
            _ => {}
        }
    }

    /// `constructor(private readonly repo: Repo)` declares a field too.
    fn parameter_properties(&mut self, method: &Node, owner: &str) {
        let Some(params) = method.child_by_field_name("parameters") else {
            return;
        };
        for param in named_children(&params) {
            let Some(access) = child_by_kind(&param, "accessibility_modifier") else {
                continue;
            };
            let Some(pattern) = param.child_by_field_name("pattern") else {
                continue;
            };
            let mut field =
                FieldDecl::new(self.text(&pattern), start_line(&param), end_line(&param));
            field.owner = Some(owner.to_string());
            field.type_name = param
                .child_by_field_name("type")
                .and_then(|t| annotation_text(&t, self.content));
            field.modifiers.push(self.text(&access));
            if child_by_kind(&param, "readonly").is_some() {
                field.modifiers.push("readonly".to_string());
            }
            self.out.fields.push(field);
        }
    }

    fn visit_variables(&mut self, node: &Node, exported: bool) {
        let is_const = node_text(node, self.content).trim_start().starts_with("const");
        for declarator in named_children(node) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(&name_node);
            let value = declarator.child_by_field_name("value");
            let is_function = value.is_some_and(|v| {
                matches!(v.kind(), "arrow_function" | "function_expression" | "function")
            });

            if let (true, Some(value)) = (is_function, value) {
                let mut decl = self.function(&value, &name, &name_node);
                decl.start_line = start_line(node);
                decl.end_line = end_line(node);
                decl.description = self.doc(node);
                if exported {
                    decl.modifiers.push("export".to_string());
                }
                self.out.functions.push(decl);
                continue;
            }

            let mut field = FieldDecl::new(name.clone(), start_line(node), end_line(node));
            field.type_name = declarator
                .child_by_field_name("type")
                .and_then(|t| annotation_text(&t, self.content))
                .or_else(|| value.and_then(|v| self.constructed_type(&v)));
            if is_const {
                field.modifiers.push("const".to_string());
            }
            if exported {
                field.modifiers.push("export".to_string());
            }
            field.annotations = self.annotations(&name_node, &name);
            self.out.fields.push(field);
        }
    }

    fn function(&self, node: &Node, name: &str, name_node: &Node) -> FunctionDecl {
        let mut decl = FunctionDecl::new(name, start_line(node), end_line(node));
        decl.annotations = self.annotations(name_node, name);
        decl.return_type = node
            .child_by_field_name("return_type")
            .and_then(|t| annotation_text(&t, self.content));
        if let Some(params) = node.child_by_field_name("parameters") {
            decl.parameters = self.parameters(&params);
        } else if let Some(single) = node.child_by_field_name("parameter") {
            decl.parameters.push(ParameterInfo {
                name: self.text(&single),
                type_name: None,
                description: None,
            });
        }
        if node_text(node, self.content).trim_start().starts_with("async") {
            decl.modifiers.push("async".to_string());
        }
        if let Some(body) = node.child_by_field_name("body") {
            let body_text = node_text(&body, self.content);
            decl.calls = scan_calls(body_text, start_line(&body), name, self.language);
        }
        decl
    }

    fn parameters(&self, params: &Node) -> Vec<ParameterInfo> {
        let mut result = Vec::new();
        for param in named_children(params) {
            let (name, type_name) = match param.kind() {
                "required_parameter" | "optional_parameter" => (
                    param.child_by_field_name("pattern").map(|p| self.text(&p)),
                    param
                        .child_by_field_name("type")
                        .and_then(|t| annotation_text(&t, self.content)),
                ),
                "identifier" | "rest_pattern" => (Some(self.text(&param)), None),
                "assignment_pattern" => {
                    (param.child_by_field_name("left").map(|l| self.text(&l)), None)
                }
                _ => (None, None),
            };
            if let Some(name) = name {
                result.push(ParameterInfo {
                    name,
                    type_name,
                    description: None,
                });
            }
        }
        result
    }

    /// Keyword and accessibility modifiers written before the member name.
    fn member_modifiers(&self, member: &Node, name_node: &Node) -> Vec<String> {
        let mut modifiers = Vec::new();
        let mut cursor = member.walk();
        for child in member.children(&mut cursor) {
            if child.start_byte() >= name_node.start_byte() {
                break;
            }
            match child.kind() {
                "accessibility_modifier" | "override_modifier" => modifiers.push(self.text(&child)),
                kind if MEMBER_MODIFIERS.contains(&kind) => modifiers.push(kind.to_string()),
                _ => {}
            }
        }
        if self.text(name_node).starts_with('#') && !modifiers.iter().any(|m| m == "private") {
            modifiers.push("private".to_string());
        }
        modifiers
    }

    /// `new Foo(...)` on the right-hand side names the variable's type.
    fn constructed_type(&self, value: &Node) -> Option<String> {
        if value.kind() != "new_expression" {
            return None;
        }
        value.child_by_field_name("constructor").map(|c| self.text(&c))
    }

    fn annotations(&self, name_node: &Node, name: &str) -> Vec<codegraph_core::AnnotationInfo> {
        scan_annotations(&self.lines, start_line(name_node), name, self.language)
    }

    fn doc(&self, node: &Node) -> Option<String> {
        let target = match node.parent() {
            Some(parent) if parent.kind() == "export_statement" => parent,
            _ => *node,
        };
        preceding_doc_comment(&target, self.content)
    }

    fn text(&self, node: &Node) -> String {
        node_text(node, self.content).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CallKind;

    const SOURCE: &str = r#"import { Injectable } from '@angular/core';
import { User, Role as R } from './models/user';
import * as utils from '../shared/index';

/** Loads users from the API. */
@Injectable({
  providedIn: 'root'
})
export class UserService extends BaseService<User> implements OnInit, Cache<string, User> {
  private cache: Map<string, User>;
  static instances = 0;

  constructor(private readonly http: HttpClient, name: string) {
    super(name);
  }

  async load(id: string): Promise<User> {
    const user = await this.http.get(id);
    this.cache.set(id, user);
    return normalize(user);
  }
}

export interface Repo<T> extends Base, Paged<T> {
  find(id: string): T;
}

export enum Color { Red, Green }

export function normalize(user: User): User {
  return user;
}

export const API_URL = 'http://x';
const handler = async (event) => {
  process(event);
};
"#;

    fn extract(source: &str, path: &str) -> FileExtraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        TypeScriptExtractor::extract_with_language(&tree, source, path, Language::TypeScript)
    }

    #[test]
    fn import_specifiers_become_module_names() {
        assert_eq!(import_target("./models/user"), "user");
        assert_eq!(import_target("../shared/index"), "shared");
        assert_eq!(import_target("./util.js"), "util");
        assert_eq!(import_target("@angular/core"), "@angular/core");
        assert_eq!(module_name("src/app/index.ts"), "app");
        assert_eq!(split_type_list("A, B<C, D>, E"), vec!["A", "B<C, D>", "E"]);
    }

    #[test]
    fn extracts_imports() {
        let out = extract(SOURCE, "src/app/user.service.ts");
        assert_eq!(out.namespace, "user.service");
        let imports: Vec<(&str, Vec<&str>, Option<&str>)> = out
            .imports
            .iter()
            .map(|i| {
                (
                    i.module.as_str(),
                    i.items.iter().map(String::as_str).collect(),
                    i.alias.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            imports,
            vec![
                ("@angular/core", vec!["Injectable"], None),
                ("user.Role", vec![], Some("R")),
                ("user", vec!["User"], None),
                ("shared", vec![], Some("utils")),
            ]
        );
    }

    #[test]
    fn extracts_class_with_heritage_members_and_decorators() {
        let out = extract(SOURCE, "user.service.ts");
        let service = out.find_type("UserService").unwrap();
        assert_eq!(service.extends, vec!["BaseService"]);
        assert_eq!(service.implements, vec!["OnInit", "Cache<string, User>"]);
        assert_eq!(service.annotations[0].name, "Injectable");
        assert_eq!(service.annotations[0].framework.as_deref(), Some("Angular"));
        assert_eq!(service.description.as_deref(), Some("Loads users from the API."));

        let fields: Vec<(&str, Option<&str>)> = out
            .fields
            .iter()
            .filter(|f| f.owner.as_deref() == Some("UserService"))
            .map(|f| (f.name.as_str(), f.type_name.as_deref()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("cache", Some("Map<string, User>")),
                ("instances", None),
                ("http", Some("HttpClient")),
            ]
        );

        let ctor = out.functions.iter().find(|f| f.is_constructor).unwrap();
        assert_eq!(ctor.parameters.len(), 2);
        assert_eq!(ctor.calls[0].kind, CallKind::Super);

        let load = out.functions.iter().find(|f| f.name == "load").unwrap();
        assert_eq!(load.owner.as_deref(), Some("UserService"));
        assert_eq!(load.return_type.as_deref(), Some("Promise<User>"));
        assert!(load.modifiers.contains(&"async".to_string()));
        let calls: Vec<(CallKind, Option<&str>, &str)> = load
            .calls
            .iter()
            .map(|c| (c.kind, c.receiver.as_deref(), c.method.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (CallKind::Instance, Some("http"), "get"),
                (CallKind::Instance, Some("cache"), "set"),
                (CallKind::Function, None, "normalize"),
            ]
        );
    }

    #[test]
    fn extracts_top_level_declarations() {
        let out = extract(SOURCE, "user.service.ts");
        let repo = out.find_type("Repo").unwrap();
        assert_eq!(repo.kind, TypeKind::Interface);
        assert_eq!(repo.extends, vec!["Base", "Paged<T>"]);
        assert!(out
            .functions
            .iter()
            .any(|f| f.name == "find" && f.owner.as_deref() == Some("Repo")));
        assert_eq!(out.find_type("Color").unwrap().kind, TypeKind::Enum);

        let top: Vec<&str> = out
            .functions
            .iter()
            .filter(|f| f.owner.is_none())
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(top, vec!["normalize", "handler"]);
        let handler = out.functions.iter().find(|f| f.name == "handler").unwrap();
        assert_eq!(handler.calls[0].method, "process");

        let api = out.fields.iter().find(|f| f.name == "API_URL").unwrap();
        assert!(api.owner.is_none());
        assert!(api.modifiers.contains(&"const".to_string()));
    }

    #[test]
    fn javascript_uses_the_same_extractor() {
        let source = concat!(
            "class Cart extends Base {\n",
            "  add(item) {\n    this.items.push(item);\n    notify(item);\n  }\n}\n"
        );
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let out = TypeScriptExtractor::extract_with_language(
            &tree,
            source,
            "cart.js",
            Language::JavaScript,
        );
        assert_eq!(out.language, Language::JavaScript);
        let cart = out.find_type("Cart").unwrap();
        assert_eq!(cart.extends, vec!["Base"]);
        let add = out.functions.iter().find(|f| f.name == "add").unwrap();
        assert_eq!(add.owner.as_deref(), Some("Cart"));
        assert_eq!(add.parameters[0].name, "item");
        assert_eq!(add.calls.len(), 2);
    }
}

// ABOUTME: Python AST extractor producing modules, classes, functions, fields and imports
// ABOUTME: Decorators, docstrings and self-assigned attributes are folded into the IR

use super::extractor_utils::{
    end_line, file_stem, named_children, node_text, parent_dir_name, start_line,
};
use crate::annotations::scan_annotations;
use crate::calls::scan_calls;
use crate::ir::{FieldDecl, FileExtraction, FunctionDecl, ImportInfo, TypeDecl, TypeKind};
use crate::text_processor::docstring_text;
use codegraph_core::{Language, ParameterInfo};
use std::collections::HashMap;
use tree_sitter::{Node, Tree, TreeCursor};

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag"];
const ABSTRACT_BASES: &[&str] = &["ABC", "Protocol"];

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        let mut collector = PythonCollector::new(content, file_path);
        let root = tree.root_node();
        let mut cursor = tree.walk();
        collector.collect_imports(&mut cursor);
        collector.visit_block(&root, None);
        collector.out
    }
}

impl super::LanguageExtractor for PythonExtractor {
    fn extract(tree: &Tree, content: &str, file_path: &str) -> FileExtraction {
        PythonExtractor::extract(tree, content, file_path)
    }

    fn language() -> Language {
        Language::Python
    }
}

/// Module name for a Python file: its stem, or the package directory for `__init__.py`.
pub fn module_name(file_path: &str) -> String {
    let stem = file_stem(file_path);
    if stem == "__init__" {
        if let Some(dir) = parent_dir_name(file_path) {
            return dir;
        }
    }
    stem
}

/// Module ids are file stems, so dotted import paths keep their last segment.
fn import_target(dotted: &str) -> String {
    let trimmed = dotted.trim_start_matches('.');
    trimmed.rsplit('.').next().unwrap_or(trimmed).to_string()
}

struct PythonCollector<'a> {
    content: &'a str,
    lines: Vec<&'a str>,
    out: FileExtraction,
}

impl<'a> PythonCollector<'a> {
    fn new(content: &'a str, file_path: &'a str) -> Self {
        Self {
            content,
            lines: content.lines().collect(),
            out: FileExtraction::new(Language::Python, file_path, module_name(file_path)),
        }
    }

    fn collect_imports(&mut self, cursor: &mut TreeCursor) {
        let node = cursor.node();
        match node.kind() {
            "import_statement" => {
                self.visit_import(&node);
                return;
            }
            "import_from_statement" => {
                self.visit_from_import(&node);
                return;
            }
            _ => {}
        }
        if cursor.goto_first_child() {
            loop {
                self.collect_imports(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    fn visit_import(&mut self, node: &Node) {
        let line = start_line(node);
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (module, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name").map(|n| self.text(&n)),
                    name.child_by_field_name("alias").map(|n| self.text(&n)),
                ),
                _ => (Some(self.text(&name)), None),
            };
            if let Some(module) = module {
                self.out.imports.push(ImportInfo {
                    module: import_target(&module),
                    items: Vec::new(),
                    alias,
                    is_wildcard: false,
                    line,
                });
            }
        }
    }

    fn visit_from_import(&mut self, node: &Node) {
        let line = start_line(node);
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = import_target(&self.text(&module_node));
        if module.is_empty() {
            // `from . import x`: each name is itself a sibling module.
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let target = match name.kind() {
                    "aliased_import" => name.child_by_field_name("name"),
                    _ => Some(name),
                };
                if let Some(target) = target {
                    self.out.imports.push(ImportInfo {
                        module: import_target(&self.text(&target)),
                        items: Vec::new(),
                        alias: None,
                        is_wildcard: false,
                        line,
                    });
                }
            }
            return;
        }

        let is_wildcard = named_children(node).iter().any(|c| c.kind() == "wildcard_import");
        let mut items = Vec::new();
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            if name.kind() == "aliased_import" {
                let original = name.child_by_field_name("name").map(|n| self.text(&n));
                let alias = name.child_by_field_name("alias").map(|n| self.text(&n));
                if let (Some(original), Some(alias)) = (original, alias) {
                    self.out.imports.push(ImportInfo {
                        module: format!("{}.{}", module, original),
                        items: Vec::new(),
                        alias: Some(alias),
                        is_wildcard: false,
                        line,
                    });
                }
            } else {
                items.push(self.text(&name));
            }
        }
        if !items.is_empty() || is_wildcard {
            self.out.imports.push(ImportInfo {
                module,
                items,
                alias: None,
                is_wildcard,
                line,
            });
        }
    }

    fn visit_block(&mut self, block: &Node, owner: Option<&str>) {
        for child in named_children(block) {
            let definition = if child.kind() == "decorated_definition" {
                child.child_by_field_name("definition")
            } else {
                Some(child)
            };
            let Some(definition) = definition else { continue };
            match definition.kind() {
                "class_definition" => self.visit_class(&definition),
                "function_definition" => self.visit_function(&definition, owner),
                "expression_statement" => self.visit_assignment(&definition, owner),
                _ => {}
            }
        }
    }

    fn visit_class(&mut self, node: &Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(&name_node);
        let mut bases = Vec::new();
        let mut is_abstract = false;
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            for base in named_children(&superclasses) {
                match base.kind() {
                    "identifier" | "attribute" => bases.push(self.text(&base)),
                    "keyword_argument" => {
                        if self.text(&base).replace(' ', "").ends_with("ABCMeta") {
                            is_abstract = true;
                        }
                    }
                    _ => {}
                }
            }
        }
        let last_segment = |b: &String| b.rsplit('.').next().unwrap_or(b).to_string();
        let kind = if bases.iter().any(|b| ENUM_BASES.contains(&last_segment(b).as_str())) {
            TypeKind::Enum
        } else {
            TypeKind::Class
        };
        is_abstract |= bases.iter().any(|b| ABSTRACT_BASES.contains(&last_segment(b).as_str()));

        let mut decl = TypeDecl::new(name.clone(), kind, start_line(node), end_line(node));
        decl.extends = bases.into_iter().filter(|b| b != "object").collect();
        decl.annotations =
            scan_annotations(&self.lines, start_line(&name_node), &name, Language::Python);
        decl.description = node.child_by_field_name("body").and_then(|b| self.docstring(&b));
        if is_abstract {
            decl.modifiers.push("abstract".to_string());
        }
        self.out.push_type(decl);

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_block(&body, Some(name.as_str()));
            self.collect_instance_fields(&body, &name);
        }
    }

    fn visit_function(&mut self, node: &Node, owner: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(&name_node);
        let mut decl = FunctionDecl::new(name.clone(), start_line(node), end_line(node));
        decl.owner = owner.map(str::to_string);
        decl.is_constructor = owner.is_some() && name == "__init__";
        decl.annotations =
            scan_annotations(&self.lines, start_line(&name_node), &name, Language::Python);
        decl.return_type = node.child_by_field_name("return_type").map(|t| self.text(&t));
        if let Some(params) = node.child_by_field_name("parameters") {
            decl.parameters = self.parameters(&params, owner.is_some());
        }

        if self.text(node).starts_with("async") {
            decl.modifiers.push("async".to_string());
        }
        for annotation in &decl.annotations {
            let modifier = match annotation.name.as_str() {
                "staticmethod" => "static",
                "classmethod" => "classmethod",
                "abstractmethod" | "abc.abstractmethod" => "abstract",
                "property" => "property",
                _ => continue,
            };
            decl.modifiers.push(modifier.to_string());
        }
        if name.starts_with('_') && !name.starts_with("__") {
            decl.modifiers.push("private".to_string());
        }

        if let Some(body) = node.child_by_field_name("body") {
            decl.description = self.docstring(&body);
            decl.calls =
                scan_calls(self.text_ref(&body), start_line(&body), &name, Language::Python);
        }
        // Nested functions are not entities; their calls were scanned with the body.
        self.out.functions.push(decl);
    }

    fn parameters(&self, params: &Node, is_method: bool) -> Vec<ParameterInfo> {
        let mut result = Vec::new();
        for param in named_children(params) {
            let (name, type_name) = match param.kind() {
                "identifier" => (Some(self.text(&param)), None),
                "typed_parameter" => (
                    named_children(&param).first().map(|n| self.text(n)),
                    param.child_by_field_name("type").map(|t| self.text(&t)),
                ),
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name").map(|n| self.text(&n)),
                    param.child_by_field_name("type").map(|t| self.text(&t)),
                ),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (Some(self.text(&param)), None)
                }
                _ => (None, None),
            };
            let Some(name) = name else { continue };
            if is_method && result.is_empty() && (name == "self" || name == "cls") {
                continue;
            }
            result.push(ParameterInfo {
                name,
                type_name,
                description: None,
            });
        }
        result
    }

    /// Class attributes and module variables: `x = ...` and `x: T = ...`.
    fn visit_assignment(&mut self, statement: &Node, owner: Option<&str>) {
        let Some(assignment) = named_children(statement)
            .into_iter()
            .find(|c| c.kind() == "assignment")
        else {
            return;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = self.text(&left);
        if name.starts_with("__") && name.ends_with("__") {
            return;
        }
        let mut field = FieldDecl::new(name, start_line(statement), end_line(statement));
        field.owner = owner.map(str::to_string);
        field.type_name = assignment
            .child_by_field_name("type")
            .map(|t| self.text(&t))
            .or_else(|| {
                assignment
                    .child_by_field_name("right")
                    .and_then(|r| self.constructed_type(&r))
            });
        if name_is_constant(&field.name) {
            field.modifiers.push("final".to_string());
        }
        self.out.fields.push(field);
    }

    /// `self.x = ...` inside any method of the class becomes a field of it.
    fn collect_instance_fields(&mut self, class_body: &Node, class_name: &str) {
        let mut found: Vec<FieldDecl> = Vec::new();
        for child in named_children(class_body) {
            let function = match child.kind() {
                "decorated_definition" => child.child_by_field_name("definition"),
                "function_definition" => Some(child),
                _ => None,
            };
            let Some(function) = function.filter(|f| f.kind() == "function_definition") else {
                continue;
            };
            let param_types: HashMap<String, String> = function
                .child_by_field_name("parameters")
                .map(|p| self.parameters(&p, true))
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| Some((p.name, p.type_name?)))
                .collect();
            let Some(body) = function.child_by_field_name("body") else {
                continue;
            };
            let mut stack = vec![body];
            while let Some(node) = stack.pop() {
                if node.kind() == "function_definition" || node.kind() == "class_definition" {
                    continue;
                }
                if node.kind() == "assignment" {
                    if let Some(field) = self.instance_field(&node, class_name, &param_types) {
                        if !found.iter().any(|f| f.name == field.name) {
                            found.push(field);
                        }
                    }
                }
                let mut children = named_children(&node);
                children.reverse();
                stack.extend(children);
            }
        }

        let existing: Vec<String> = self
            .out
            .fields
            .iter()
            .filter(|f| f.owner.as_deref() == Some(class_name))
            .map(|f| f.name.clone())
            .collect();
        found.sort_by_key(|f| f.start_line);
        self.out
            .fields
            .extend(found.into_iter().filter(|f| !existing.contains(&f.name)));
    }

    fn instance_field(
        &self,
        assignment: &Node,
        class_name: &str,
        param_types: &HashMap<String, String>,
    ) -> Option<FieldDecl> {
        let left = assignment.child_by_field_name("left")?;
        if left.kind() != "attribute" {
            return None;
        }
        let object = left.child_by_field_name("object")?;
        if self.text_ref(&object) != "self" {
            return None;
        }
        let name = self.text(&left.child_by_field_name("attribute")?);
        let mut field = FieldDecl::new(name, start_line(assignment), end_line(assignment));
        field.owner = Some(class_name.to_string());
        field.type_name = assignment
            .child_by_field_name("type")
            .map(|t| self.text(&t))
            .or_else(|| {
                let right = assignment.child_by_field_name("right")?;
                match right.kind() {
                    "identifier" => param_types.get(self.text_ref(&right)).cloned(),
                    _ => self.constructed_type(&right),
                }
            });
        if field.name.starts_with('_') {
            field.modifiers.push("private".to_string());
        }
        Some(field)
    }

    /// `Foo(...)` on the right-hand side names the assigned type.
    fn constructed_type(&self, value: &Node) -> Option<String> {
        if value.kind() != "call" {
            return None;
        }
        let function = value.child_by_field_name("function")?;
        let text = self.text(&function);
        let last = text.rsplit('.').next().unwrap_or(&text);
        last.chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
            .then_some(text)
    }

    fn docstring(&self, body: &Node) -> Option<String> {
        let first = named_children(body).into_iter().next()?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = named_children(&first).into_iter().next()?;
        if string.kind() != "string" {
            return None;
        }
        docstring_text(self.text_ref(&string))
    }

    fn text(&self, node: &Node) -> String {
        node_text(node, self.content).to_string()
    }

    fn text_ref(&self, node: &Node) -> &'a str {
        node_text(node, self.content)
    }
}

fn name_is_constant(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CallKind;

    const SOURCE: &str = r#"from .models import User, Order as O
import logging
import numpy as np

MAX_USERS = 10


class Status(Enum):
    ACTIVE = 1


@dataclass
class UserService(BaseService):
    """Manages users.

    Longer text.
    """
    default_limit: int = 5

    def __init__(self, repo: UserRepository, name="svc"):
        self.repo = repo
        self.cache = Cache()
        self._count = 0

    @staticmethod
    def create(*args, **kwargs) -> "UserService":
        return UserService(args)

    def find(self, user_id: int) -> User:
        """Finds a user."""
        user = self.repo.get(user_id)
        validate(user)
        return user


def helper():
    def inner():
        pass
    return inner()
"#;

    fn extract(source: &str, path: &str) -> FileExtraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        PythonExtractor::extract(&tree, source, path)
    }

    #[test]
    fn module_names_follow_file_layout() {
        assert_eq!(module_name("app/services/user_service.py"), "user_service");
        assert_eq!(module_name("app/services/__init__.py"), "services");
        assert_eq!(import_target("app.models"), "models");
        assert_eq!(import_target("..util"), "util");
    }

    #[test]
    fn extracts_imports() {
        let out = extract(SOURCE, "app/user_service.py");
        assert_eq!(out.namespace, "user_service");
        let modules: Vec<(&str, Option<&str>)> = out
            .imports
            .iter()
            .map(|i| (i.module.as_str(), i.alias.as_deref()))
            .collect();
        assert_eq!(
            modules,
            vec![
                ("models.Order", Some("O")),
                ("models", None),
                ("logging", None),
                ("numpy", Some("np")),
            ]
        );
        assert_eq!(out.imports[1].items, vec!["User"]);
    }

    #[test]
    fn extracts_classes_and_members() {
        let out = extract(SOURCE, "user_service.py");
        assert_eq!(out.find_type("Status").unwrap().kind, TypeKind::Enum);

        let service = out.find_type("UserService").unwrap();
        assert_eq!(service.extends, vec!["BaseService"]);
        assert_eq!(service.annotations[0].name, "dataclass");
        assert_eq!(service.description.as_deref(), Some("Manages users."));

        let init = out.functions.iter().find(|f| f.name == "__init__").unwrap();
        assert!(init.is_constructor);
        assert_eq!(init.owner.as_deref(), Some("UserService"));
        let params: Vec<(&str, Option<&str>)> = init
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.type_name.as_deref()))
            .collect();
        assert_eq!(params, vec![("repo", Some("UserRepository")), ("name", None)]);

        let create = out.functions.iter().find(|f| f.name == "create").unwrap();
        assert!(create.modifiers.contains(&"static".to_string()));
        assert_eq!(create.parameters[0].name, "*args");

        let find = out.functions.iter().find(|f| f.name == "find").unwrap();
        assert_eq!(find.return_type.as_deref(), Some("User"));
        assert_eq!(find.description.as_deref(), Some("Finds a user."));
        let calls: Vec<(CallKind, Option<&str>, &str)> = find
            .calls
            .iter()
            .map(|c| (c.kind, c.receiver.as_deref(), c.method.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (CallKind::Instance, Some("repo"), "get"),
                (CallKind::Function, None, "validate"),
            ]
        );
    }

    #[test]
    fn extracts_fields_and_skips_nested_functions() {
        let out = extract(SOURCE, "user_service.py");
        let fields: Vec<(&str, Option<&str>, Option<&str>)> = out
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.owner.as_deref(), f.type_name.as_deref()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("MAX_USERS", None, None),
                ("ACTIVE", Some("Status"), None),
                ("default_limit", Some("UserService"), Some("int")),
                ("repo", Some("UserService"), Some("UserRepository")),
                ("cache", Some("UserService"), Some("Cache")),
                ("_count", Some("UserService"), None),
            ]
        );
        assert!(out.fields[0].modifiers.contains(&"final".to_string()));

        let names: Vec<&str> = out.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["__init__", "create", "find", "helper"]);
        let helper = out.functions.iter().find(|f| f.name == "helper").unwrap();
        assert!(helper.owner.is_none());
        assert_eq!(helper.calls[0].method, "inner");
    }
}

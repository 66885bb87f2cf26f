// ABOUTME: Turns a FileExtraction into ParsedEntity/ParsedRelationship values
// ABOUTME: Owns the qualified-name ID scheme, call resolution and per-scan package dedup

use crate::calls::is_collection_method;
use crate::ir::{CallKind, CallSite, FieldDecl, FileExtraction, FunctionDecl, TypeDecl, TypeKind};
use crate::languages::extractor_utils::file_stem;
use crate::resolve::TypeResolver;
use crate::text_processor::type_identifiers;
use codegraph_core::{
    EntityType, Language, ParseError, ParsedEntity, ParsedRelationship, RelationshipType,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const PRIMITIVES: &[&str] = &[
    "void", "int", "long", "short", "byte", "char", "boolean", "float", "double", "var", "None",
    "string", "number", "any", "unknown", "never", "undefined", "null", "object",
];
const BUILTIN_PREFIXES: &[&str] = &["java.lang.", "builtins.", "typescript."];

/// Package and module ids already emitted during one scan, per project.
///
/// Cloning shares the underlying set, so every extraction task of a scan can
/// hold its own handle.
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    seen: Arc<DashMap<(String, String), ()>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is registered for `project_id`.
    pub fn register(&self, project_id: &str, id: &str) -> bool {
        self.seen
            .insert((project_id.to_string(), id.to_string()), ())
            .is_none()
    }

    pub fn contains(&self, project_id: &str, id: &str) -> bool {
        self.seen
            .contains_key(&(project_id.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Everything one file contributes to the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub file_path: String,
    pub entities: Vec<ParsedEntity>,
    pub relationships: Vec<ParsedRelationship>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn empty(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: ParseError) -> Self {
        Self {
            file_path: error.file_path.clone(),
            errors: vec![error],
            ..Self::default()
        }
    }
}

pub struct EntityBuilder<'a> {
    extraction: &'a FileExtraction,
    project_id: &'a str,
    registry: &'a PackageRegistry,
    resolver: TypeResolver<'a>,
    entities: Vec<ParsedEntity>,
    relationships: Vec<ParsedRelationship>,
}

impl<'a> EntityBuilder<'a> {
    pub fn new(
        extraction: &'a FileExtraction,
        project_id: &'a str,
        registry: &'a PackageRegistry,
    ) -> Self {
        Self {
            extraction,
            project_id,
            registry,
            resolver: TypeResolver::new(
                extraction.language,
                &extraction.namespace,
                &extraction.imports,
            ),
            entities: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn build(mut self) -> ParseResult {
        let extraction = self.extraction;
        let file = extraction.file_path.clone();
        let container = self.emit_container();

        for decl in extraction.types() {
            self.emit_type(decl, container.as_deref());
        }
        for function in &extraction.functions {
            self.emit_function(function, container.as_deref());
        }
        for field in &extraction.fields {
            self.emit_field(field, container.as_deref());
        }
        if let Some(module) = container.as_deref() {
            self.emit_imports(module);
        }

        let entities = merge_entities(self.entities);
        let relationships = dedup_relationships(self.relationships);
        debug!(
            file = %file,
            entities = entities.len(),
            relationships = relationships.len(),
            "built graph facts"
        );
        ParseResult {
            file_path: file,
            entities,
            relationships,
            errors: extraction.errors.clone(),
        }
    }

    fn qualify(&self, name: &str) -> String {
        self.resolver.qualify(name)
    }

    fn entity(&self, entity_type: EntityType, name: &str, qualified_name: String) -> ParsedEntity {
        let file_path = &self.extraction.file_path;
        let mut entity = ParsedEntity::new(entity_type, name, qualified_name, file_path);
        entity
            .attributes
            .insert("language".into(), self.extraction.language.as_str().into());
        entity
    }

    fn relate(&mut self, rel_type: RelationshipType, source: &str, target: &str, line: u32) {
        self.relationships.push(
            ParsedRelationship::new(rel_type, source, target, &self.extraction.file_path)
                .at_line(line),
        );
    }

    /// Emits the package (Java) and the file's module entity; returns the id
    /// top-level declarations belong to.
    fn emit_container(&mut self) -> Option<String> {
        let namespace = self.extraction.namespace.clone();
        match self.extraction.language {
            Language::Java => {
                if self.registry.register(self.project_id, &namespace) {
                    let package = self
                        .entity(EntityType::Package, &namespace, namespace.clone())
                        .with_description(Some(format!("Java package: {}", namespace)));
                    self.entities.push(package);
                }
                let stem = file_stem(&self.extraction.file_path);
                let module_id = format!("{}/{}", namespace, stem);
                let module = self
                    .entity(EntityType::Module, &stem, module_id.clone())
                    .with_lines(1, self.line_count());
                self.entities.push(module);
                self.relate(RelationshipType::BelongsTo, &module_id, &namespace, 1);
                Some(namespace)
            }
            Language::Python | Language::TypeScript | Language::JavaScript => {
                if namespace == "__main__" || namespace.is_empty() {
                    return None;
                }
                if self.registry.register(self.project_id, &namespace) {
                    let module = self
                        .entity(EntityType::Module, &namespace, namespace.clone())
                        .with_lines(1, self.line_count())
                        .with_description(Some(format!(
                            "{} module: {}",
                            language_label(self.extraction.language),
                            namespace
                        )));
                    self.entities.push(module);
                }
                Some(namespace)
            }
        }
    }

    fn line_count(&self) -> u32 {
        self.extraction
            .types()
            .map(|t| t.end_line)
            .chain(self.extraction.functions.iter().map(|f| f.end_line))
            .chain(self.extraction.fields.iter().map(|f| f.end_line))
            .max()
            .unwrap_or(1)
    }

    fn emit_type(&mut self, decl: &TypeDecl, container: Option<&str>) {
        let id = self.qualify(&decl.name);
        let entity_type = match decl.kind {
            TypeKind::Class => EntityType::Class,
            TypeKind::Interface => EntityType::Interface,
            TypeKind::Enum => EntityType::Enum,
        };
        let mut entity = self
            .entity(entity_type, &decl.name, id.clone())
            .with_lines(decl.start_line, decl.end_line)
            .with_description(decl.description.clone())
            .with_modifiers(decl.modifiers.clone());
        entity.annotations = decl.annotations.clone();
        entity
            .attributes
            .insert("is_abstract".into(), decl.is_abstract().into());
        if !decl.extends.is_empty() {
            entity.attributes.insert("extends".into(), decl.extends.clone().into());
        }
        if !decl.implements.is_empty() {
            entity
                .attributes
                .insert("implements".into(), decl.implements.clone().into());
        }
        self.entities.push(entity);

        // Java's module entity lives in the package; other languages' types belong to the module.
        if let Some(container) = container {
            self.relate(RelationshipType::BelongsTo, &id, container, decl.start_line);
        }
        for parent in &decl.extends {
            if let Some(target) = self.resolver.resolve(parent) {
                self.relate(RelationshipType::Extends, &id, &target, decl.start_line);
            }
        }
        for interface in &decl.implements {
            if let Some(target) = self.resolver.resolve(interface) {
                self.relate(RelationshipType::Implements, &id, &target, decl.start_line);
            }
        }
    }

    fn emit_function(&mut self, function: &FunctionDecl, container: Option<&str>) {
        let extraction = self.extraction;
        let owner_decl = function
            .owner
            .as_deref()
            .and_then(|owner| extraction.find_type(owner));
        let (entity_type, id, owner_id) = match (&function.owner, owner_decl) {
            (Some(owner), Some(_)) => {
                let owner_id = self.qualify(owner);
                let id = format!("{}.{}", owner_id, function.name);
                (EntityType::Method, id, Some(owner_id))
            }
            (Some(_), None) => return,
            (None, _) => (EntityType::Function, self.qualify(&function.name), None),
        };

        let mut entity = self
            .entity(entity_type, &function.name, id.clone())
            .with_lines(function.start_line, function.end_line)
            .with_description(function.description.clone())
            .with_modifiers(function.modifiers.clone());
        entity.annotations = function.annotations.clone();
        entity.parameters = function.parameters.clone();
        entity.return_type = function.return_type.clone();
        if function.is_constructor {
            entity.attributes.insert("is_constructor".into(), true.into());
        }
        self.entities.push(entity);

        match &owner_id {
            Some(owner_id) => {
                self.relate(RelationshipType::Contains, owner_id, &id, function.start_line)
            }
            None => {
                if let Some(container) = container {
                    self.relate(RelationshipType::BelongsTo, &id, container, function.start_line);
                }
            }
        }

        let mut referenced = Vec::new();
        for param in &function.parameters {
            if let Some(type_name) = &param.type_name {
                referenced.extend(self.referenced_types(type_name));
            }
        }
        if let Some(return_type) = &function.return_type {
            referenced.extend(self.referenced_types(return_type));
        }
        let mut seen = HashSet::new();
        for target in referenced {
            if seen.insert(target.clone()) {
                self.relate(RelationshipType::References, &id, &target, function.start_line);
            }
        }

        self.emit_calls(function, &id, owner_decl);
    }

    fn emit_field(&mut self, field: &FieldDecl, container: Option<&str>) {
        let owner_id = match field.owner.as_deref() {
            Some(owner) if self.extraction.find_type(owner).is_some() => Some(self.qualify(owner)),
            Some(_) => return,
            None => None,
        };
        let id = match &owner_id {
            Some(owner_id) => format!("{}.{}", owner_id, field.name),
            None => self.qualify(&field.name),
        };
        let mut entity = self
            .entity(EntityType::Field, &field.name, id.clone())
            .with_lines(field.start_line, field.end_line)
            .with_modifiers(field.modifiers.clone());
        entity.annotations = field.annotations.clone();
        if let Some(type_name) = &field.type_name {
            entity.attributes.insert("field_type".into(), type_name.clone().into());
        }
        self.entities.push(entity);

        match &owner_id {
            Some(owner_id) => {
                self.relate(RelationshipType::Contains, owner_id, &id, field.start_line)
            }
            None => {
                if let Some(container) = container {
                    self.relate(RelationshipType::BelongsTo, &id, container, field.start_line);
                }
            }
        }
        if let Some(type_name) = &field.type_name {
            let mut seen = HashSet::new();
            for target in self.referenced_types(type_name) {
                if seen.insert(target.clone()) {
                    self.relate(RelationshipType::References, &id, &target, field.start_line);
                }
            }
        }
    }

    fn emit_imports(&mut self, module: &str) {
        // Java files import from their module entity; others from the module itself.
        let source = match self.extraction.language {
            Language::Java => format!("{}/{}", module, file_stem(&self.extraction.file_path)),
            _ => module.to_string(),
        };
        let mut seen = HashSet::new();
        for import in &self.extraction.imports {
            let target = import.module.clone();
            if target.is_empty() || target == source || !seen.insert(target.clone()) {
                continue;
            }
            self.relationships.push(
                ParsedRelationship::new(
                    RelationshipType::Imports,
                    &source,
                    &target,
                    &self.extraction.file_path,
                )
                .at_line(import.line)
                .with_attribute("is_wildcard", import.is_wildcard),
            );
        }
    }

    /// Resolved, non-builtin type ids mentioned in a type expression.
    fn referenced_types(&self, type_expr: &str) -> Vec<String> {
        type_identifiers(type_expr)
            .into_iter()
            .filter(|ident| !PRIMITIVES.contains(&ident.as_str()))
            .filter_map(|ident| self.resolver.resolve(&ident))
            .filter(|resolved| !BUILTIN_PREFIXES.iter().any(|p| resolved.starts_with(p)))
            .collect()
    }

    fn emit_calls(&mut self, function: &FunctionDecl, source_id: &str, owner: Option<&TypeDecl>) {
        let extraction = self.extraction;
        let field_types: HashMap<&str, &str> = extraction
            .fields
            .iter()
            .filter(|f| f.owner.is_some() && f.owner.as_deref() == owner.map(|o| o.name.as_str()))
            .filter_map(|f| Some((f.name.as_str(), f.type_name.as_deref()?)))
            .collect();

        let mut seen = HashSet::new();
        for call in &function.calls {
            let Some(target) = self.resolve_call(call, owner, &field_types) else {
                continue;
            };
            if target == source_id || !seen.insert(target.clone()) {
                continue;
            }
            self.relationships.push(
                ParsedRelationship::new(
                    RelationshipType::Calls,
                    source_id,
                    &target,
                    &self.extraction.file_path,
                )
                .at_line(call.line)
                .with_attribute("call_type", call.kind.as_str()),
            );
        }
    }

    fn resolve_call(
        &self,
        call: &CallSite,
        owner: Option<&TypeDecl>,
        field_types: &HashMap<&str, &str>,
    ) -> Option<String> {
        let language = self.extraction.language;
        let owner_id = owner.map(|o| self.qualify(&o.name));
        match call.kind {
            CallKind::Instance => {
                let receiver = call.receiver.as_deref()?;
                if matches!(receiver, "this" | "self" | "cls") {
                    return owner_id.map(|o| format!("{}.{}", o, call.method));
                }
                if let Some(type_name) = field_types.get(receiver) {
                    let resolved = self.resolver.resolve(type_name)?;
                    return Some(format!("{}.{}", resolved, call.method));
                }
                if is_collection_method(language, &call.method) {
                    return None;
                }
                Some(format!("{}.{}", receiver, call.method))
            }
            CallKind::Static | CallKind::Constructor => {
                let receiver = call.receiver.as_deref()?;
                let resolved = self.resolver.resolve(receiver)?;
                Some(format!("{}.{}", resolved, call.method))
            }
            CallKind::Super => {
                let parent = owner?.extends.first()?;
                let resolved = self.resolver.resolve(parent)?;
                Some(format!("{}.{}", resolved, call.method))
            }
            CallKind::Function => {
                if let Some(imported) = self.imported_function(&call.method) {
                    return Some(imported);
                }
                match (language, owner_id) {
                    (
                        Language::Java | Language::TypeScript | Language::JavaScript,
                        Some(owner_id),
                    ) => {
                        Some(format!("{}.{}", owner_id, call.method))
                    }
                    _ => Some(self.qualify(&call.method)),
                }
            }
        }
    }

    fn imported_function(&self, name: &str) -> Option<String> {
        if self.extraction.language == Language::Java {
            return None;
        }
        self.extraction
            .imports
            .iter()
            .find(|i| i.items.iter().any(|item| item == name))
            .map(|i| format!("{}.{}", i.module, name))
    }
}

fn language_label(language: Language) -> &'static str {
    match language {
        Language::Java => "Java",
        Language::Python => "Python",
        Language::TypeScript => "TypeScript",
        Language::JavaScript => "JavaScript",
    }
}

/// Same id twice in one file (overloads, redefinitions): the first
/// occurrence keeps its position, modifiers and annotations are unioned.
fn merge_entities(entities: Vec<ParsedEntity>) -> Vec<ParsedEntity> {
    let mut order: Vec<ParsedEntity> = Vec::with_capacity(entities.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for entity in entities {
        match index.get(&entity.id) {
            Some(&at) => {
                let existing = &mut order[at];
                for modifier in entity.modifiers {
                    if !existing.modifiers.contains(&modifier) {
                        existing.modifiers.push(modifier);
                    }
                }
                for annotation in entity.annotations {
                    if !existing.annotations.iter().any(|a| a.name == annotation.name) {
                        existing.annotations.push(annotation);
                    }
                }
                if existing.description.is_none() {
                    existing.description = entity.description;
                }
            }
            None => {
                index.insert(entity.id.clone(), order.len());
                order.push(entity);
            }
        }
    }
    order
}

fn dedup_relationships(relationships: Vec<ParsedRelationship>) -> Vec<ParsedRelationship> {
    let mut seen = HashSet::new();
    relationships
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

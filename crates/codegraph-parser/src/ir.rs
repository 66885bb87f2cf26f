// ABOUTME: Language-neutral intermediate representation produced by every extractor
// ABOUTME: The builder turns a FileExtraction into entities and relationships

use codegraph_core::{AnnotationInfo, Language, ParameterInfo, ParseError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Imported module or, for Java, the imported type's full name.
    pub module: String,
    /// Names bound from the module (`from m import a, b`, `import { a } from 'm'`).
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub is_wildcard: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    /// Raw supertype names as written in source, generics included.
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>, kind: TypeKind, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            extends: Vec::new(),
            implements: Vec::new(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            description: None,
            start_line,
            end_line,
        }
    }

    pub fn covers(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line)
    }

    pub fn is_abstract(&self) -> bool {
        self.kind == TypeKind::Interface || self.modifiers.iter().any(|m| m == "abstract")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Constructor,
    Super,
    Static,
    Instance,
    Function,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Constructor => "constructor",
            CallKind::Super => "super",
            CallKind::Static => "static",
            CallKind::Instance => "instance",
            CallKind::Function => "function",
        }
    }
}

/// A call site found in a body; resolution to a target id happens in the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub kind: CallKind,
    /// Receiver as written (`this`, `service`, `Math`); the class for constructors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub method: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Name of the owning type; `None` for module-level functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_constructor: bool,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub calls: Vec<CallSite>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            owner: None,
            parameters: Vec::new(),
            return_type: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            description: None,
            is_constructor: false,
            start_line,
            end_line,
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    pub start_line: u32,
    pub end_line: u32,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            owner: None,
            type_name: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            start_line,
            end_line,
        }
    }
}

/// Everything one extractor learned about one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExtraction {
    pub language: Language,
    pub file_path: String,
    /// Java package or Python/TypeScript module name.
    pub namespace: String,
    #[serde(default)]
    pub imports: Vec<ImportInfo>,
    #[serde(default)]
    pub classes: Vec<TypeDecl>,
    #[serde(default)]
    pub interfaces: Vec<TypeDecl>,
    #[serde(default)]
    pub enums: Vec<TypeDecl>,
    /// Methods carry an owner, module-level functions do not.
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub errors: Vec<ParseError>,
}

impl FileExtraction {
    pub fn new(
        language: Language,
        file_path: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            language,
            file_path: file_path.into(),
            namespace: namespace.into(),
            imports: Vec::new(),
            classes: Vec::new(),
            interfaces: Vec::new(),
            enums: Vec::new(),
            functions: Vec::new(),
            fields: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn push_type(&mut self, decl: TypeDecl) {
        match decl.kind {
            TypeKind::Class => self.classes.push(decl),
            TypeKind::Interface => self.interfaces.push(decl),
            TypeKind::Enum => self.enums.push(decl),
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.classes
            .iter()
            .chain(self.interfaces.iter())
            .chain(self.enums.iter())
    }

    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.classes.is_empty()
            && self.interfaces.is_empty()
            && self.enums.is_empty()
            && self.functions.is_empty()
            && self.fields.is_empty()
    }
}

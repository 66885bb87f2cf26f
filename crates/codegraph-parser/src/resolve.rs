use crate::ir::ImportInfo;
use crate::text_processor::strip_generics;
use codegraph_core::Language;

const PYTHON_BUILTINS: &[&str] = &[
    "object", "str", "int", "float", "bool", "bytes", "list", "dict", "tuple", "set", "None",
    "Exception", "BaseException", "ValueError", "TypeError", "AttributeError", "KeyError",
    "RuntimeError",
];

const TYPESCRIPT_BUILTINS: &[&str] = &[
    "Object", "Array", "String", "Number", "Boolean", "Date", "RegExp", "Error", "Promise", "Map",
    "Set", "Function", "Symbol", "any", "unknown", "void", "never", "string", "number", "boolean",
];

const JAVA_LANG: &[&str] = &[
    "String", "Object", "Math", "System", "Thread", "Class", "Integer", "Long", "Double", "Float",
    "Boolean", "Exception", "RuntimeException", "IllegalArgumentException",
    "IllegalStateException",
];

/// Resolves simple type names written in one file to qualified names.
///
/// Order: already qualified names pass through, then the file's imports,
/// then language builtins, then the file's own namespace.
pub struct TypeResolver<'a> {
    language: Language,
    namespace: &'a str,
    imports: &'a [ImportInfo],
}

impl<'a> TypeResolver<'a> {
    pub fn new(language: Language, namespace: &'a str, imports: &'a [ImportInfo]) -> Self {
        Self {
            language,
            namespace,
            imports,
        }
    }

    pub fn resolve(&self, type_name: &str) -> Option<String> {
        let name = strip_generics(type_name).trim_end_matches("[]").trim();
        if name.is_empty() {
            return None;
        }
        if name.contains('.') {
            return Some(name.to_string());
        }
        if let Some(found) = self.from_imports(name) {
            return Some(found);
        }
        if let Some(builtin) = self.builtin(name) {
            return Some(builtin);
        }
        Some(self.qualify(name))
    }

    /// Names declared in this file's namespace.
    pub fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.namespace, name)
        }
    }

    fn from_imports(&self, name: &str) -> Option<String> {
        for import in self.imports {
            match self.language {
                Language::Java => {
                    let last = import.module.rsplit('.').next().unwrap_or(&import.module);
                    if !import.is_wildcard && last == name {
                        return Some(import.module.clone());
                    }
                }
                _ => {
                    if import.items.iter().any(|item| item == name) {
                        return Some(format!("{}.{}", import.module, name));
                    }
                    if import.alias.as_deref() == Some(name) {
                        return Some(import.module.clone());
                    }
                }
            }
        }
        None
    }

    fn builtin(&self, name: &str) -> Option<String> {
        match self.language {
            Language::Java if JAVA_LANG.contains(&name) => Some(format!("java.lang.{}", name)),
            Language::Python if PYTHON_BUILTINS.contains(&name) => {
                Some(format!("builtins.{}", name))
            }
            Language::TypeScript | Language::JavaScript if TYPESCRIPT_BUILTINS.contains(&name) => {
                Some(format!("typescript.{}", name))
            }
            _ => None,
        }
    }
}

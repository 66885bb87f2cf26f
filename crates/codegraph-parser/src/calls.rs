// ABOUTME: Line-based call-site scanner run over method and function bodies
// ABOUTME: Classifies each site once and filters logging, keyword and builtin noise

use crate::ir::{CallKind, CallSite};
use crate::text_processor::LineCleaner;
use codegraph_core::Language;
use once_cell::sync::Lazy;
use regex::Regex;

static CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_$][\w$]*)\s*(<[\w$\s,.?<>\[\]]*>)?\s*\(").unwrap());

/// Words that may directly precede a call expression. Any other identifier in
/// that position means the match is a declaration (`void run(`, `def run(`).
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "await", "yield", "throw", "raise", "else", "case", "in", "not", "and", "or", "is",
    "typeof", "do", "assert", "lambda", "from", "of", "delete",
];

const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "try", "catch", "finally", "return", "throw", "assert",
    "synchronized", "this", "elif", "except", "with", "def", "class", "function", "typeof",
    "instanceof", "import", "not", "and", "or", "lambda", "await", "yield", "sizeof",
];

const JAVA_SKIP_RECEIVERS: &[&str] = &[
    "System",
    "Logger",
    "log",
    "logger",
    "LOG",
    "LOGGER",
    "out",
    "err",
];
const JAVA_SKIP_METHODS: &[&str] = &[
    "out", "err", "println", "print", "printf", "debug", "info", "warn", "error", "trace",
];
const JAVA_BUILTIN_TYPES: &[&str] = &[
    "String",
    "Integer",
    "Boolean",
    "Double",
    "Float",
    "Long",
    "Object",
];
const JAVA_COLLECTION_METHODS: &[&str] = &[
    "add", "addAll", "remove", "get", "put", "size", "isEmpty", "contains", "containsKey",
    "stream", "forEach", "iterator", "equals", "hashCode", "toString", "length", "charAt",
    "substring", "append", "clear",
];

const PYTHON_SKIP_RECEIVERS: &[&str] = &["logging", "logger", "log", "LOGGER"];
const PYTHON_SKIP_METHODS: &[&str] = &[
    "debug",
    "info",
    "warning",
    "warn",
    "error",
    "exception",
    "critical",
];
const PYTHON_SKIP_FUNCTIONS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "tuple", "set",
    "frozenset", "bytes", "type", "isinstance", "issubclass", "hasattr", "getattr", "setattr",
    "delattr", "max", "min", "sum", "any", "all", "enumerate", "zip", "map", "filter", "open",
    "input", "repr", "exec", "eval", "compile", "sorted", "reversed", "iter", "next", "id", "hash",
    "abs", "round", "format", "vars", "dir", "callable", "object",
];
const PYTHON_BUILTIN_TYPES: &[&str] = &[
    "Exception", "BaseException", "ValueError", "TypeError", "KeyError", "IndexError",
    "RuntimeError", "AttributeError", "NotImplementedError", "StopIteration",
];
const PYTHON_COLLECTION_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "get", "items", "keys", "values", "update",
    "copy", "join", "split", "strip", "format", "startswith", "endswith", "lower", "upper",
    "replace",
];

const TS_SKIP_RECEIVERS: &[&str] = &[
    "console",
    "window",
    "document",
    "JSON",
    "Math",
    "Object",
    "Array",
];
const TS_SKIP_METHODS: &[&str] = &["log", "error", "warn", "info", "debug"];
const TS_SKIP_FUNCTIONS: &[&str] = &[
    "setTimeout", "setInterval", "clearTimeout", "clearInterval", "parseInt", "parseFloat",
    "isNaN", "isFinite", "require",
];
const TS_BUILTIN_TYPES: &[&str] = &[
    "Object", "Array", "String", "Number", "Boolean", "Date", "RegExp", "Error", "Promise", "Map",
    "Set",
];
const TS_COLLECTION_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "map", "filter", "reduce", "forEach", "find", "some",
    "every", "includes", "indexOf", "slice", "splice", "join", "concat", "keys", "values",
    "entries", "toString", "then", "catch",
];

/// Constructor member name used for call targets in each language.
pub fn constructor_name(language: Language) -> &'static str {
    match language {
        Language::Java => "<init>",
        Language::Python => "__init__",
        Language::TypeScript | Language::JavaScript => "constructor",
    }
}

/// Methods of standard collections and strings; calls to these on receivers
/// of unknown type are dropped during resolution.
pub fn is_collection_method(language: Language, method: &str) -> bool {
    let list = match language {
        Language::Java => JAVA_COLLECTION_METHODS,
        Language::Python => PYTHON_COLLECTION_METHODS,
        Language::TypeScript | Language::JavaScript => TS_COLLECTION_METHODS,
    };
    list.contains(&method)
}

pub fn is_builtin_constructor(language: Language, type_name: &str) -> bool {
    let list = match language {
        Language::Java => JAVA_BUILTIN_TYPES,
        Language::Python => PYTHON_BUILTIN_TYPES,
        Language::TypeScript | Language::JavaScript => TS_BUILTIN_TYPES,
    };
    list.contains(&type_name)
}

fn is_noise(language: Language, receiver: &str, method: &str) -> bool {
    let (receivers, methods) = match language {
        Language::Java => (JAVA_SKIP_RECEIVERS, JAVA_SKIP_METHODS),
        Language::Python => (PYTHON_SKIP_RECEIVERS, PYTHON_SKIP_METHODS),
        Language::TypeScript | Language::JavaScript => (TS_SKIP_RECEIVERS, TS_SKIP_METHODS),
    };
    receivers.contains(&receiver) && methods.contains(&method)
}

fn is_skipped_function(language: Language, name: &str) -> bool {
    KEYWORDS.contains(&name)
        || match language {
            Language::Java => false,
            Language::Python => PYTHON_SKIP_FUNCTIONS.contains(&name),
            Language::TypeScript | Language::JavaScript => TS_SKIP_FUNCTIONS.contains(&name),
        }
}

fn trailing_word(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

fn trailing_path(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$' || *c == '.')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Scans `body` (which starts on `first_line`) for call sites. Bare calls to
/// `own_name` are dropped so recursion does not produce self edges.
pub fn scan_calls(
    body: &str,
    first_line: u32,
    own_name: &str,
    language: Language,
) -> Vec<CallSite> {
    let mut cleaner = LineCleaner::new(language);
    let mut sites = Vec::new();

    for (offset, raw) in body.lines().enumerate() {
        let line_no = first_line + offset as u32;
        let line = cleaner.clean(raw);
        for caps in CALL.captures_iter(&line) {
            let Some(ident) = caps.get(1) else { continue };
            let prefix = &line[..ident.start()];
            if let Some(site) = classify(prefix, ident.as_str(), own_name, language) {
                sites.push(CallSite { line: line_no, ..site });
            }
        }
    }
    sites
}

fn classify(prior: &str, ident: &str, own_name: &str, language: Language) -> Option<CallSite> {
    let prior = prior.trim_end();
    let site = |kind, receiver: Option<&str>, method: &str| CallSite {
        kind,
        receiver: receiver.map(str::to_string),
        method: method.to_string(),
        line: 0,
    };

    if let Some(before_dot) = prior.strip_suffix('.') {
        let before_dot = before_dot.trim_end().trim_end_matches('?');
        let path = trailing_path(before_dot);
        let ahead = before_dot[..before_dot.len() - path.len()].trim_end();
        if trailing_word(ahead) == "new" && !path.is_empty() {
            let class = format!("{}{}", path, ident);
            if is_builtin_constructor(language, ident) {
                return None;
            }
            return Some(site(CallKind::Constructor, Some(&class), constructor_name(language)));
        }
        if before_dot.ends_with("super()") {
            return Some(site(CallKind::Super, Some("super"), ident));
        }
        let receiver = trailing_word(before_dot);
        if receiver.is_empty() || receiver.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if is_noise(language, receiver, ident) {
            return None;
        }
        return Some(match receiver {
            "super" => site(CallKind::Super, Some("super"), ident),
            "this" | "self" | "cls" => site(CallKind::Instance, Some(receiver), ident),
            r if is_capitalized(r) => site(CallKind::Static, Some(r), ident),
            r => site(CallKind::Instance, Some(r), ident),
        });
    }

    if prior.ends_with('@') {
        return None;
    }
    let previous = trailing_word(prior);
    if previous == "new" {
        if is_builtin_constructor(language, ident) {
            return None;
        }
        return Some(site(CallKind::Constructor, Some(ident), constructor_name(language)));
    }
    if !previous.is_empty() && !EXPRESSION_KEYWORDS.contains(&previous) {
        // `Type name(` or `def name(`: a declaration, not a call.
        return None;
    }
    if ident == "super" {
        // Python's `super()` only prefixes the real call that follows it.
        if language == Language::Python {
            return None;
        }
        return Some(site(CallKind::Super, Some("super"), constructor_name(language)));
    }
    if ident == own_name || is_skipped_function(language, ident) {
        return None;
    }
    if is_capitalized(ident) && language != Language::Java {
        if is_builtin_constructor(language, ident) {
            return None;
        }
        return Some(site(CallKind::Constructor, Some(ident), constructor_name(language)));
    }
    Some(site(CallKind::Function, None, ident))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sites: &[CallSite]) -> Vec<(CallKind, Option<&str>, &str)> {
        sites
            .iter()
            .map(|s| (s.kind, s.receiver.as_deref(), s.method.as_str()))
            .collect()
    }

    #[test]
    fn java_sites_are_classified_once() {
        let body = r#"{
    Order o = new Order(id);
    repository.save(o);
    String s = Utils.format("x.y(z)");
    super.validate(o);
    logger.info("saved");
    System.out.println(o);
    process(o);
    this.audit(o);
}"#;
        let sites = scan_calls(body, 10, "place", Language::Java);
        assert_eq!(
            kinds(&sites),
            vec![
                (CallKind::Constructor, Some("Order"), "<init>"),
                (CallKind::Instance, Some("repository"), "save"),
                (CallKind::Static, Some("Utils"), "format"),
                (CallKind::Super, Some("super"), "validate"),
                (CallKind::Function, None, "process"),
                (CallKind::Instance, Some("this"), "audit"),
            ]
        );
        assert_eq!(sites[0].line, 11);
        assert_eq!(sites[4].line, 17);
    }

    #[test]
    fn recursion_keywords_and_declarations_are_skipped() {
        let body = concat!(
            "{\n  if (n > 0) { walk(n - 1); }\n  for (int i = 0; i < n; i++) {}\n",
            "  Runnable r = new Runnable() { public void run() { tick(); } };\n}"
        );
        let sites = scan_calls(body, 1, "walk", Language::Java);
        assert_eq!(
            kinds(&sites),
            vec![
                (CallKind::Constructor, Some("Runnable"), "<init>"),
                (CallKind::Function, None, "tick"),
            ]
        );
    }

    #[test]
    fn python_sites() {
        let body = concat!(
            "    super().__init__(name)\n    self.repo.save(item)\n    helper(len(items))\n",
            "    user = User(name)\n    print(user)\n    logger.info('x')\n",
            "    raise ValueError('bad')"
        );
        let sites = scan_calls(body, 5, "__init__", Language::Python);
        assert_eq!(
            kinds(&sites),
            vec![
                (CallKind::Super, Some("super"), "__init__"),
                (CallKind::Instance, Some("repo"), "save"),
                (CallKind::Function, None, "helper"),
                (CallKind::Constructor, Some("User"), "__init__"),
            ]
        );
    }

    #[test]
    fn typescript_sites() {
        let body = concat!(
            "{\n  const svc = new UserService(http);\n  console.log(`a.b(${x})`);\n",
            "  await this.load();\n  items.map(i => fmt(i));\n  setTimeout(done, 10);\n}"
        );
        let sites = scan_calls(body, 1, "init", Language::TypeScript);
        assert_eq!(
            kinds(&sites),
            vec![
                (CallKind::Constructor, Some("UserService"), "constructor"),
                (CallKind::Instance, Some("this"), "load"),
                (CallKind::Instance, Some("items"), "map"),
                (CallKind::Function, None, "fmt"),
            ]
        );
    }
}

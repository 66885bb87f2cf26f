// ABOUTME: Backward scanner for Java annotations and Python/TypeScript decorators
// ABOUTME: Tags each annotation with a framework and category from static tables

use crate::text_processor::{split_top_level, strip_quotes, top_level_assignment};
use codegraph_core::{
    AnnotationInfo, AnnotationKind, AnnotationParameter, Language, ParameterValueType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ANNOTATION_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z_][\w.]*)").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?[lLfFdD]?$").unwrap());

/// Collects the annotations attached to a declaration whose name sits on
/// `decl_line` (1-based). Inline annotations before `name` on that line are
/// included, then contiguous annotation lines above it, skipping blank and
/// comment lines. Multi-line argument lists are joined back together.
pub fn scan_annotations(
    lines: &[&str],
    decl_line: u32,
    name: &str,
    language: Language,
) -> Vec<AnnotationInfo> {
    let idx = decl_line.saturating_sub(1) as usize;
    let Some(decl) = lines.get(idx) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    let prefix = match find_word(decl, name) {
        Some(pos) => &decl[..pos],
        None => "",
    };
    if prefix.contains('@') {
        found.extend(parse_annotations(prefix, decl_line, language));
    }

    let mut pending: Vec<&str> = Vec::new();
    let mut unbalanced = 0i32;
    let mut collected: Vec<Vec<AnnotationInfo>> = Vec::new();
    for i in (0..idx).rev() {
        let line = lines[i].trim();
        if line.is_empty() || is_comment_line(line, language) {
            continue;
        }
        if line.starts_with('@') {
            let mut text = line.to_string();
            for continuation in pending.drain(..).rev() {
                text.push(' ');
                text.push_str(continuation);
            }
            unbalanced = 0;
            collected.push(parse_annotations(&text, (i + 1) as u32, language));
            continue;
        }
        let delta = bracket_balance(line);
        if unbalanced > 0 || (delta > 0 && !line.ends_with(';') && !line.ends_with('}')) {
            unbalanced += delta;
            // The line opening the argument list must itself be an annotation.
            if unbalanced <= 0 || pending.len() >= 20 {
                break;
            }
            pending.push(line);
            continue;
        }
        break;
    }

    let mut result: Vec<AnnotationInfo> = collected.into_iter().rev().flatten().collect();
    result.extend(found);
    result
}

fn find_word(line: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    let mut start = 0;
    while let Some(pos) = line[start..].find(word) {
        let at = start + pos;
        let before = line[..at].chars().next_back();
        let after = line[at + word.len()..].chars().next();
        let boundary = |c: Option<char>| c.map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if boundary(before) && boundary(after) {
            return Some(at);
        }
        start = at + word.len();
    }
    None
}

fn is_comment_line(line: &str, language: Language) -> bool {
    match language {
        Language::Python => line.starts_with('#'),
        _ => line.starts_with("//") || line.starts_with("/*") || line.starts_with('*'),
    }
}

/// Closing minus opening brackets.
fn bracket_balance(line: &str) -> i32 {
    let opens = line.matches(['(', '[', '{']).count() as i32;
    let closes = line.matches([')', ']', '}']).count() as i32;
    closes - opens
}

/// Parses every `@Name(args)?` occurrence in `text`.
pub fn parse_annotations(text: &str, line: u32, language: Language) -> Vec<AnnotationInfo> {
    let kind = match language {
        Language::Java => AnnotationKind::Annotation,
        _ => AnnotationKind::Decorator,
    };
    let mut annotations = Vec::new();
    let mut search_from = 0;
    while let Some(caps) = ANNOTATION_START.captures(&text[search_from..]) {
        let Some(whole) = caps.get(0) else { break };
        let name = caps[1].trim_end_matches('.').to_string();
        let mut end = search_from + whole.end();
        let rest = &text[end..];
        let mut args = None;
        if rest.trim_start().starts_with('(') {
            let open = end + (rest.len() - rest.trim_start().len());
            if let Some(close) = matching_paren(text, open) {
                args = Some(&text[open + 1..close]);
                end = close + 1;
            } else {
                args = Some(&text[open + 1..]);
                end = text.len();
            }
        }
        let (framework, category) = classify(&name, language);
        annotations.push(AnnotationInfo {
            name: name.clone(),
            kind: kind.clone(),
            parameters: args.map(parse_parameters).unwrap_or_default(),
            source_line: line,
            framework: framework.map(str::to_string),
            category: category.map(str::to_string),
        });
        search_from = end;
    }
    annotations
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (offset, c) in text[open..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(open + offset);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Splits an argument list into named and positional parameters.
pub fn parse_parameters(args: &str) -> Vec<AnnotationParameter> {
    split_top_level(args.trim(), ',')
        .into_iter()
        .map(|piece| match top_level_assignment(&piece) {
            Some(eq) => {
                let value = piece[eq + 1..].trim();
                AnnotationParameter {
                    name: Some(piece[..eq].trim().to_string()),
                    value: strip_quotes(value).to_string(),
                    value_type: infer_value_type(value),
                }
            }
            None => AnnotationParameter {
                name: None,
                value: strip_quotes(&piece).to_string(),
                value_type: infer_value_type(&piece),
            },
        })
        .collect()
}

pub fn infer_value_type(value: &str) -> ParameterValueType {
    let v = value.trim();
    if v.starts_with('"') || v.starts_with('\'') || v.starts_with('`') {
        ParameterValueType::String
    } else if matches!(v, "true" | "false" | "True" | "False") {
        ParameterValueType::Boolean
    } else if matches!(v, "null" | "None" | "undefined") {
        ParameterValueType::Null
    } else if NUMBER.is_match(v) {
        ParameterValueType::Number
    } else if v.starts_with('[') || v.starts_with('(') || v.starts_with('{') {
        ParameterValueType::Collection
    } else {
        ParameterValueType::Identifier
    }
}

type Table = HashMap<&'static str, (&'static str, &'static str)>;

fn table(entries: &[(&'static str, &'static str, &'static str)]) -> Table {
    entries
        .iter()
        .map(|(name, framework, category)| (*name, (*framework, *category)))
        .collect()
}

static JAVA_TABLE: Lazy<Table> = Lazy::new(|| {
    table(&[
        ("SpringBootApplication", "Spring Boot", "lifecycle"),
        ("Configuration", "Spring", "lifecycle"),
        ("Bean", "Spring", "lifecycle"),
        ("Autowired", "Spring", "injection"),
        ("Value", "Spring", "injection"),
        ("Component", "Spring", "injection"),
        ("Service", "Spring", "injection"),
        ("Repository", "Spring", "injection"),
        ("Controller", "Spring MVC", "injection"),
        ("RestController", "Spring MVC", "injection"),
        ("RequestMapping", "Spring MVC", "web"),
        ("GetMapping", "Spring MVC", "web"),
        ("PostMapping", "Spring MVC", "web"),
        ("PutMapping", "Spring MVC", "web"),
        ("DeleteMapping", "Spring MVC", "web"),
        ("PatchMapping", "Spring MVC", "web"),
        ("PathVariable", "Spring MVC", "web"),
        ("RequestParam", "Spring MVC", "web"),
        ("RequestBody", "Spring MVC", "web"),
        ("ResponseBody", "Spring MVC", "web"),
        ("CrossOrigin", "Spring MVC", "web"),
        ("Valid", "Spring Validation", "validation"),
        ("Validated", "Spring Validation", "validation"),
        ("Entity", "JPA", "persistence"),
        ("Table", "JPA", "persistence"),
        ("Id", "JPA", "persistence"),
        ("GeneratedValue", "JPA", "persistence"),
        ("Column", "JPA", "persistence"),
        ("JoinColumn", "JPA", "persistence"),
        ("OneToMany", "JPA", "persistence"),
        ("ManyToOne", "JPA", "persistence"),
        ("ManyToMany", "JPA", "persistence"),
        ("OneToOne", "JPA", "persistence"),
        ("Transactional", "Spring Transaction", "persistence"),
        ("Test", "JUnit", "testing"),
        ("BeforeEach", "JUnit", "lifecycle"),
        ("AfterEach", "JUnit", "lifecycle"),
        ("BeforeAll", "JUnit", "lifecycle"),
        ("AfterAll", "JUnit", "lifecycle"),
        ("Mock", "Mockito", "testing"),
        ("InjectMocks", "Mockito", "testing"),
        ("MockBean", "Spring Test", "testing"),
        ("WebMvcTest", "Spring Test", "testing"),
        ("SpringBootTest", "Spring Test", "testing"),
        ("DataJpaTest", "Spring Test", "testing"),
        ("Override", "Java Core", "language"),
        ("Deprecated", "Java Core", "language"),
        ("SuppressWarnings", "Java Core", "language"),
        ("FunctionalInterface", "Java Core", "language"),
        ("SafeVarargs", "Java Core", "language"),
        ("NotNull", "Bean Validation", "validation"),
        ("NotEmpty", "Bean Validation", "validation"),
        ("NotBlank", "Bean Validation", "validation"),
        ("Size", "Bean Validation", "validation"),
        ("Min", "Bean Validation", "validation"),
        ("Max", "Bean Validation", "validation"),
        ("Email", "Bean Validation", "validation"),
        ("Pattern", "Bean Validation", "validation"),
        ("PreAuthorize", "Spring Security", "security"),
        ("PostAuthorize", "Spring Security", "security"),
        ("Secured", "Spring Security", "security"),
        ("RolesAllowed", "Spring Security", "security"),
        ("Data", "Lombok", "codegen"),
        ("Builder", "Lombok", "codegen"),
        ("AllArgsConstructor", "Lombok", "codegen"),
        ("NoArgsConstructor", "Lombok", "codegen"),
        ("RequiredArgsConstructor", "Lombok", "codegen"),
        ("Getter", "Lombok", "codegen"),
        ("Setter", "Lombok", "codegen"),
        ("ToString", "Lombok", "codegen"),
        ("EqualsAndHashCode", "Lombok", "codegen"),
    ])
});

static PYTHON_TABLE: Lazy<Table> = Lazy::new(|| {
    table(&[
        ("app.route", "Flask", "web"),
        ("route", "Flask", "web"),
        ("before_request", "Flask", "lifecycle"),
        ("after_request", "Flask", "lifecycle"),
        ("teardown_request", "Flask", "lifecycle"),
        ("context_processor", "Flask", "web"),
        ("template_filter", "Flask", "web"),
        ("login_required", "Django", "security"),
        ("permission_required", "Django", "security"),
        ("user_passes_test", "Django", "security"),
        ("csrf_exempt", "Django", "security"),
        ("require_http_methods", "Django", "web"),
        ("require_GET", "Django", "web"),
        ("require_POST", "Django", "web"),
        ("cache_page", "Django", "caching"),
        ("never_cache", "Django", "caching"),
        ("app.get", "FastAPI", "web"),
        ("app.post", "FastAPI", "web"),
        ("app.put", "FastAPI", "web"),
        ("app.delete", "FastAPI", "web"),
        ("app.patch", "FastAPI", "web"),
        ("router.get", "FastAPI", "web"),
        ("router.post", "FastAPI", "web"),
        ("router.put", "FastAPI", "web"),
        ("router.delete", "FastAPI", "web"),
        ("pytest.fixture", "Pytest", "testing"),
        ("fixture", "Pytest", "testing"),
        ("pytest.mark.parametrize", "Pytest", "testing"),
        ("mark.parametrize", "Pytest", "testing"),
        ("pytest.mark.skip", "Pytest", "testing"),
        ("pytest.mark.skipif", "Pytest", "testing"),
        ("pytest.mark.xfail", "Pytest", "testing"),
        ("task", "Celery", "async"),
        ("shared_task", "Celery", "async"),
        ("periodic_task", "Celery", "async"),
        ("validates", "SQLAlchemy", "persistence"),
        ("reconstructor", "SQLAlchemy", "lifecycle"),
        ("hybrid_property", "SQLAlchemy", "persistence"),
        ("hybrid_method", "SQLAlchemy", "persistence"),
        ("validator", "Pydantic", "validation"),
        ("root_validator", "Pydantic", "validation"),
        ("field_validator", "Pydantic", "validation"),
        ("model_validator", "Pydantic", "validation"),
        ("property", "Python", "language"),
        ("staticmethod", "Python", "language"),
        ("classmethod", "Python", "language"),
        ("cached_property", "Python", "caching"),
        ("lru_cache", "Python", "caching"),
        ("functools.lru_cache", "Python", "caching"),
        ("wraps", "Python", "language"),
        ("dataclass", "Python", "language"),
        ("total_ordering", "Python", "language"),
        ("abstractmethod", "Python", "language"),
        ("click.command", "Click", "cli"),
        ("click.group", "Click", "cli"),
        ("click.option", "Click", "cli"),
        ("click.argument", "Click", "cli"),
        ("overload", "Typing", "language"),
        ("final", "Typing", "language"),
        ("runtime_checkable", "Typing", "language"),
    ])
});

static TYPESCRIPT_TABLE: Lazy<Table> = Lazy::new(|| {
    table(&[
        ("Component", "Angular", "ui"),
        ("Directive", "Angular", "ui"),
        ("Pipe", "Angular", "ui"),
        ("NgModule", "Angular", "lifecycle"),
        ("Input", "Angular", "ui"),
        ("Output", "Angular", "ui"),
        ("HostListener", "Angular", "ui"),
        ("ViewChild", "Angular", "ui"),
        ("Injectable", "Angular", "injection"),
        ("Inject", "NestJS", "injection"),
        ("Module", "NestJS", "lifecycle"),
        ("Controller", "NestJS", "web"),
        ("Get", "NestJS", "web"),
        ("Post", "NestJS", "web"),
        ("Put", "NestJS", "web"),
        ("Patch", "NestJS", "web"),
        ("Delete", "NestJS", "web"),
        ("Param", "NestJS", "web"),
        ("Body", "NestJS", "web"),
        ("Query", "NestJS", "web"),
        ("UseGuards", "NestJS", "security"),
        ("Entity", "TypeORM", "persistence"),
        ("Column", "TypeORM", "persistence"),
        ("PrimaryColumn", "TypeORM", "persistence"),
        ("PrimaryGeneratedColumn", "TypeORM", "persistence"),
        ("OneToMany", "TypeORM", "persistence"),
        ("ManyToOne", "TypeORM", "persistence"),
        ("ManyToMany", "TypeORM", "persistence"),
        ("OneToOne", "TypeORM", "persistence"),
        ("JoinColumn", "TypeORM", "persistence"),
        ("IsString", "class-validator", "validation"),
        ("IsNumber", "class-validator", "validation"),
        ("IsEmail", "class-validator", "validation"),
        ("IsOptional", "class-validator", "validation"),
        ("IsNotEmpty", "class-validator", "validation"),
        ("Length", "class-validator", "validation"),
        ("Min", "class-validator", "validation"),
        ("Max", "class-validator", "validation"),
    ])
});

/// Best-effort `(framework, category)`; tries the full dotted name, then
/// without its first segment, then the last segment alone.
pub fn classify(name: &str, language: Language) -> (Option<&'static str>, Option<&'static str>) {
    let table: &Table = match language {
        Language::Java => &JAVA_TABLE,
        Language::Python => &PYTHON_TABLE,
        Language::TypeScript | Language::JavaScript => &TYPESCRIPT_TABLE,
    };
    let mut candidates = vec![name];
    if let Some((_, rest)) = name.split_once('.') {
        candidates.push(rest);
    }
    if let Some(last) = name.rsplit('.').next() {
        candidates.push(last);
    }
    candidates
        .into_iter()
        .find_map(|c| table.get(c))
        .map(|(f, c)| (Some(*f), Some(*c)))
        .unwrap_or((None, None))
}

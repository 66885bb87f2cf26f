// ABOUTME: Line-oriented text helpers shared by the annotation and call scanners
// ABOUTME: Strips literals and comments, extracts doc text, splits nested lists

use codegraph_core::Language;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*").unwrap());

/// Removes string contents and comments from source lines while tracking
/// multi-line block comments and Python triple-quoted strings.
pub struct LineCleaner {
    language: Language,
    open_block: Option<&'static str>,
}

impl LineCleaner {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            open_block: None,
        }
    }

    /// Literal contents become empty quotes so `"a.b("` never looks like a call.
    pub fn clean(&mut self, line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::with_capacity(line.len());
        let mut i = 0;

        while i < chars.len() {
            if let Some(end) = self.open_block {
                match find_seq(&chars, i, end) {
                    Some(pos) => {
                        i = pos + end.chars().count();
                        self.open_block = None;
                        if end != "*/" {
                            out.push_str("\"\"");
                        }
                    }
                    None => return out,
                }
                continue;
            }

            let c = chars[i];
            match self.language {
                Language::Python => {
                    if c == '#' {
                        break;
                    }
                    if (c == '"' || c == '\'') && starts_with(&chars, i, &[c, c, c]) {
                        let end: &'static str = if c == '"' { "\"\"\"" } else { "'''" };
                        self.open_block = Some(end);
                        i += 3;
                        continue;
                    }
                }
                _ => {
                    if c == '/' && chars.get(i + 1) == Some(&'/') {
                        break;
                    }
                    if c == '/' && chars.get(i + 1) == Some(&'*') {
                        self.open_block = Some("*/");
                        i += 2;
                        continue;
                    }
                }
            }

            let is_quote = c == '"'
                || c == '\''
                || (c == '`'
                    && matches!(self.language, Language::TypeScript | Language::JavaScript));
            if is_quote {
                i = skip_literal(&chars, i);
                out.push(c);
                out.push(c);
                continue;
            }

            out.push(c);
            i += 1;
        }
        out
    }
}

fn starts_with(chars: &[char], at: usize, seq: &[char]) -> bool {
    chars.len() >= at + seq.len() && chars[at..at + seq.len()] == *seq
}

fn find_seq(chars: &[char], from: usize, seq: &str) -> Option<usize> {
    let seq: Vec<char> = seq.chars().collect();
    (from..chars.len()).find(|&i| starts_with(chars, i, &seq))
}

/// Index just past the literal opened at `start`; unterminated literals run to end of line.
fn skip_literal(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Splits on `delimiter` at nesting depth zero, outside quotes.
pub fn split_top_level(input: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ if c == delimiter && depth == 0 => {
                    let piece = current.trim();
                    if !piece.is_empty() {
                        parts.push(piece.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(c);
    }
    let piece = current.trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
    parts
}

/// Position of the first `=` at depth zero that is not part of `==`, `<=`, `>=` or `!=`.
pub fn top_level_assignment(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth: i32 = 0;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'=' if depth == 0 => {
                    let prev = i.checked_sub(1).map(|p| bytes[p]);
                    let next = bytes.get(i + 1).copied();
                    if next != Some(b'=') && !matches!(prev, Some(b'=' | b'<' | b'>' | b'!')) {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// `Map<String, List<Foo>>` -> `Map`; `list[int]` -> `list`; `Foo[]` -> `Foo`.
pub fn strip_generics(type_name: &str) -> &str {
    let end = type_name.find(['<', '[']).unwrap_or(type_name.len());
    type_name[..end].trim()
}

/// Every identifier path mentioned in a type expression, in order, deduplicated.
pub fn type_identifiers(type_expr: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in IDENTIFIER_PATH.find_iter(type_expr) {
        let ident = m.as_str().to_string();
        if !seen.contains(&ident) {
            seen.push(ident);
        }
    }
    seen
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First paragraph of a `/** ... */` block, tags excluded.
pub fn doc_comment_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("/**") {
        return None;
    }
    let body = trimmed
        .trim_start_matches("/**")
        .trim_end_matches("*/");
    let mut paragraph = Vec::new();
    for line in body.lines() {
        let line = line.trim().trim_start_matches('*').trim();
        if line.starts_with('@') {
            break;
        }
        if line.is_empty() {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        paragraph.push(line);
    }
    let text = collapse_whitespace(&paragraph.join(" "));
    (!text.is_empty()).then_some(text)
}

/// First paragraph of a Python string literal used as a docstring.
pub fn docstring_text(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    s = s.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if s.starts_with(quote) && s.ends_with(quote) && s.len() >= 2 * quote.len() {
            s = &s[quote.len()..s.len() - quote.len()];
            break;
        }
    }
    let mut paragraph = Vec::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        paragraph.push(line);
    }
    let text = collapse_whitespace(&paragraph.join(" "));
    (!text.is_empty()).then_some(text)
}

pub fn strip_quotes(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\'', '`'] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaner_blanks_strings_and_comments() {
        let mut cleaner = LineCleaner::new(Language::Java);
        assert_eq!(
            cleaner.clean(r#"log("a.b(c)"); // x.y()"#),
            r#"log(""); "#
        );
        assert_eq!(cleaner.clean("foo(); /* start"), "foo(); ");
        assert_eq!(cleaner.clean("still.comment() */ bar();"), " bar();");
    }

    #[test]
    fn cleaner_tracks_python_triple_quotes() {
        let mut cleaner = LineCleaner::new(Language::Python);
        assert_eq!(cleaner.clean("x = \"\"\"doc"), "x = ");
        assert_eq!(cleaner.clean("call() inside doc"), "");
        assert_eq!(cleaner.clean("end\"\"\" + f()"), "\"\" + f()");
        assert_eq!(cleaner.clean("g()  # h()"), "g()  ");
    }

    #[test]
    fn split_respects_nesting_and_quotes() {
        assert_eq!(
            split_top_level(r#"value = "a,b", methods = {GET, POST}, f(1, 2)"#, ','),
            vec![r#"value = "a,b""#, "methods = {GET, POST}", "f(1, 2)"]
        );
    }

    #[test]
    fn assignment_ignores_comparisons() {
        assert_eq!(top_level_assignment("name = 'x'"), Some(5));
        assert_eq!(top_level_assignment("a == b"), None);
        assert_eq!(top_level_assignment("f(a=1)"), None);
    }

    #[test]
    fn generics_and_identifiers() {
        assert_eq!(strip_generics("Map<String, Foo>"), "Map");
        assert_eq!(strip_generics("Optional[int]"), "Optional");
        assert_eq!(
            type_identifiers("Map<String, java.util.List<Foo>>"),
            vec!["Map", "String", "java.util.List", "Foo"]
        );
    }

    #[test]
    fn doc_texts_keep_first_paragraph() {
        let doc = "/**\n * Loads users.\n * Twice.\n *\n * More.\n * @param x ignored\n */";
        assert_eq!(doc_comment_text(doc).as_deref(), Some("Loads users. Twice."));
        assert_eq!(
            docstring_text("\"\"\"Compute totals.\n\n    Details.\n    \"\"\"").as_deref(),
            Some("Compute totals.")
        );
    }
}

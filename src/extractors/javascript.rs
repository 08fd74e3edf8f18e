//! JavaScript / TypeScript signature extractor
//!
//! A line-oriented scanner: declarations are recognized with regexes at
//! brace depth zero, and bodies are delimited by brace matching that skips
//! strings and comments. Extracts:
//! - `function` declarations and `const f = function / arrow` bindings
//! - Classes with `extends`, their methods and arrow-valued fields
//! - `import`, `export ... from`, `require()` and dynamic `import()` targets
//! - JSDoc first lines and calls made inside each body

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::LazyLock;

use super::{collapse_whitespace, line_of, normalize_calls, Extractor};
use crate::models::{ClassSig, FunctionSig, Language, Signatures};

pub struct JavaScriptExtractor;

impl Extractor for JavaScriptExtractor {
    fn languages(&self) -> &[Language] {
        &[Language::JavaScript, Language::TypeScript]
    }

    fn extract(&self, source: &str) -> Result<Signatures> {
        parse(source)
    }
}

const IDENT: &str = r"[A-Za-z_$][\w$]*";

/// Words that look like calls but are control flow
const NOT_CALLS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "typeof", "super", "import",
    "require", "await", "yield", "delete", "void",
];

struct Patterns {
    function: Regex,
    fn_expr: Regex,
    arrow: Regex,
    class: Regex,
    method: Regex,
    field_arrow: Regex,
    imports: Vec<Regex>,
    call: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        let binding = format!(r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>{IDENT})\s*(?::[^=]*)?=\s*(?:async\s+)?");
        Ok(Self {
            function: Regex::new(&format!(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>{IDENT})\s*(?:<[^>(]*>)?\s*\("
            ))?,
            fn_expr: Regex::new(&format!(r"{binding}function\b\s*\*?\s*(?:{IDENT})?\s*\("))?,
            arrow: Regex::new(&format!(
                r"{binding}(?:(?:<[^>(]*>)?\([^)]*\)(?:\s*:\s*[^=]+?)?|{IDENT})\s*=>"
            ))?,
            class: Regex::new(&format!(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+(?P<name>{IDENT})(?:\s*<[^>{{]*>)?(?:\s+extends\s+(?P<base>[A-Za-z_$][\w$.]*))?"
            ))?,
            method: Regex::new(&format!(
                r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?\s*(?P<name>#?{IDENT})\s*\??\s*(?:<[^>(]*>)?\s*\("
            ))?,
            field_arrow: Regex::new(&format!(
                r"^\s*(?:(?:public|private|protected|static|readonly)\s+)*(?P<name>#?{IDENT})\s*(?::[^=]*)?=\s*(?:async\s+)?(?:\([^)]*\)(?:\s*:\s*[^=]+?)?|{IDENT})\s*=>"
            ))?,
            imports: vec![
                Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(?:[\w$*{}\s,]+?\s+from\s+)?['"]([^'"]+)['"]"#)?,
                Regex::new(
                    r#"(?m)^\s*export\s+(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s+from\s+['"]([^'"]+)['"]"#,
                )?,
                Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#)?,
                Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#)?,
            ],
            call: Regex::new(&format!(r"(?P<name>{IDENT})\s*(?:<[^<>()]*>)?\s*\("))?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// A recognized function-like declaration
struct Found {
    name: String,
    name_offset: usize,
    signature: String,
    body: Option<(usize, usize)>,
    /// Offset at which scanning resumes
    resume: usize,
}

/// Parse JavaScript or TypeScript source and extract signatures
pub fn parse(source: &str) -> Result<Signatures> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| anyhow!("invalid JavaScript pattern: {}", e))?;

    let mut signatures = Signatures::default();
    signatures.imports = extract_imports(source, patterns);

    let mut pos = 0;
    while pos < source.len() {
        let (line_end, next) = line_bounds(source, pos);
        let line = &source[pos..line_end];

        if let Some(caps) = patterns.class.captures(line) {
            let Some(name) = caps.name("name") else {
                pos = next;
                continue;
            };
            let mut class = ClassSig {
                line: line_of(source, pos + name.start()),
                bases: caps
                    .name("base")
                    .map(|b| vec![b.as_str().to_string()])
                    .unwrap_or_default(),
                methods: Default::default(),
                doc: jsdoc(source, pos),
            };

            pos = match source[pos..].find('{').map(|i| pos + i) {
                Some(open) => {
                    let close = find_closing(source, open, b'{', b'}').unwrap_or(source.len());
                    parse_members(source, open + 1, close, patterns, &mut class);
                    next_line_start(source, close)
                }
                None => next,
            };
            signatures.classes.insert(name.as_str().to_string(), class);
            continue;
        }

        let found = paren_callable(source, pos, line, &patterns.function)
            .or_else(|| paren_callable(source, pos, line, &patterns.fn_expr))
            .or_else(|| arrow_callable(source, pos, line, &patterns.arrow));

        if let Some(found) = found {
            let sig = function_sig(source, &found, patterns, pos);
            pos = found.resume;
            signatures.functions.insert(found.name, sig);
            continue;
        }

        pos = skip_line(source, pos, line, next);
    }

    Ok(signatures)
}

/// Methods and arrow-valued fields directly inside a class body
fn parse_members(source: &str, start: usize, end: usize, patterns: &Patterns, class: &mut ClassSig) {
    let mut pos = start;
    while pos < end {
        let (line_end, next) = line_bounds(source, pos);
        let line = &source[pos..line_end.min(end)];

        let found = paren_callable(source, pos, line, &patterns.method)
            .filter(|f| !NOT_CALLS.contains(&f.name.as_str()))
            .or_else(|| arrow_callable(source, pos, line, &patterns.field_arrow));

        if let Some(found) = found {
            let sig = function_sig(source, &found, patterns, pos);
            pos = found.resume;
            class.methods.insert(found.name, sig);
            continue;
        }

        pos = skip_line(source, pos, line, next);
    }
}

fn function_sig(source: &str, found: &Found, patterns: &Patterns, line_start: usize) -> FunctionSig {
    let calls = found
        .body
        .map(|(start, end)| collect_calls(&source[start..end], patterns))
        .unwrap_or_default();

    FunctionSig {
        line: line_of(source, found.name_offset),
        signature: found.signature.clone(),
        calls: normalize_calls(calls, &found.name),
        doc: jsdoc(source, line_start),
    }
}

/// Declaration ending in `(`: params, then a `{` body or a `;`
fn paren_callable(source: &str, pos: usize, line: &str, regex: &Regex) -> Option<Found> {
    let caps = regex.captures(line)?;
    let name = caps.name("name")?;
    let open = pos + caps.get(0)?.end() - 1;
    let close = find_closing(source, open, b'(', b')')?;

    let rest = &source[close + 1..];
    let terminator = rest.find(['{', ';']).map(|i| close + 1 + i);

    let (sig_end, body) = match terminator {
        Some(t) if source.as_bytes()[t] == b'{' => {
            let body_end = find_closing(source, t, b'{', b'}').map_or(source.len(), |c| c + 1);
            (t, Some((t, body_end)))
        }
        Some(t) => (t, None),
        None => (close + 1, None),
    };

    let resume = match body {
        Some((_, body_end)) => next_line_start(source, body_end.saturating_sub(1)),
        None => next_line_start(source, sig_end),
    };

    Some(Found {
        name: name.as_str().to_string(),
        name_offset: pos + name.start(),
        signature: collapse_whitespace(source[pos..sig_end].trim()),
        body,
        resume,
    })
}

/// Arrow binding: a `{` block body or an expression to end of line
fn arrow_callable(source: &str, pos: usize, line: &str, regex: &Regex) -> Option<Found> {
    let caps = regex.captures(line)?;
    let name = caps.name("name")?;
    let arrow_end = pos + caps.get(0)?.end();

    let after = &source[arrow_end..];
    let body_start = arrow_end + (after.len() - after.trim_start().len());

    let body = if source[body_start..].starts_with('{') {
        let close = find_closing(source, body_start, b'{', b'}').map_or(source.len(), |c| c + 1);
        (body_start, close)
    } else {
        (arrow_end, line_bounds(source, body_start).0)
    };

    Some(Found {
        name: name.as_str().to_string(),
        name_offset: pos + name.start(),
        signature: collapse_whitespace(source[pos..arrow_end].trim()),
        body: Some(body),
        resume: next_line_start(source, body.1.saturating_sub(1)),
    })
}

/// Advance past a line, jumping over any block it opens
fn skip_line(source: &str, pos: usize, line: &str, next: usize) -> usize {
    match line.find('{') {
        Some(i) => match find_closing(source, pos + i, b'{', b'}') {
            Some(close) => next_line_start(source, close).max(next),
            None => source.len(),
        },
        None => next,
    }
}

fn extract_imports(source: &str, patterns: &Patterns) -> Vec<String> {
    let mut found: Vec<(usize, String)> = patterns
        .imports
        .iter()
        .flat_map(|re| re.captures_iter(source))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort();

    let mut imports: Vec<String> = Vec::new();
    for (_, target) in found {
        if !imports.contains(&target) {
            imports.push(target);
        }
    }
    imports
}

fn collect_calls(body: &str, patterns: &Patterns) -> Vec<String> {
    patterns
        .call
        .captures_iter(body)
        .filter_map(|caps| caps.name("name"))
        .map(|m| m.as_str())
        .filter(|name| !NOT_CALLS.contains(name))
        .map(str::to_string)
        .collect()
}

/// First text line of a `/** ... */` block ending right before `pos`
fn jsdoc(source: &str, pos: usize) -> Option<String> {
    let before = source[..pos].trim_end();
    if !before.ends_with("*/") {
        return None;
    }
    let start = before.rfind("/**")?;
    before[start + 3..before.len() - 2]
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .find(|l| !l.is_empty() && !l.starts_with('@'))
        .map(str::to_string)
}

/// Index of the delimiter closing the one at `open`, skipping strings and comments
fn find_closing(source: &str, open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else if b == b'"' || b == b'\'' || b == b'`' {
            quote = Some(b);
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            i = source[i..].find('\n').map_or(bytes.len(), |n| i + n);
            continue;
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = source[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            continue;
        } else if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }

    None
}

/// End of the line at `pos` (without the newline) and start of the next one
fn line_bounds(source: &str, pos: usize) -> (usize, usize) {
    match source[pos..].find('\n') {
        Some(i) => (pos + i, pos + i + 1),
        None => (source.len(), source.len()),
    }
}

fn next_line_start(source: &str, pos: usize) -> usize {
    line_bounds(source, pos.min(source.len())).1
}

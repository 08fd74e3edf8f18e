//! Shell script signature extractor
//!
//! Recognizes `name() {` and `function name {` definitions, `source` / `.`
//! includes, and the command words invoked inside each function body.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::LazyLock;

use super::{normalize_calls, Extractor};
use crate::models::{FunctionSig, Language, Signatures};

pub struct ShellExtractor;

impl Extractor for ShellExtractor {
    fn languages(&self) -> &[Language] {
        &[Language::Shell]
    }

    fn extract(&self, source: &str) -> Result<Signatures> {
        parse(source)
    }
}

const KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "for", "in", "do", "done", "while", "until", "case",
    "esac", "function", "return", "local", "export", "declare", "readonly", "set", "shift",
    "break", "continue", "true", "false", "exit",
];

struct Patterns {
    function: Regex,
    source: Regex,
    command: Regex,
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(|| {
    Ok(Patterns {
        function: Regex::new(
            r"^\s*(?:function\s+(?P<kw>[A-Za-z_][\w:.-]*)\s*(?:\(\s*\))?|(?P<name>[A-Za-z_][\w:.-]*)\s*\(\s*\))\s*\{?",
        )?,
        source: Regex::new(r#"^\s*(?:source|\.)\s+["']?([^"'\s;]+)"#)?,
        command: Regex::new(r"^[A-Za-z_][\w-]*$")?,
    })
});

/// Parse a shell script and extract signatures
pub fn parse(source: &str) -> Result<Signatures> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| anyhow!("invalid shell pattern: {}", e))?;

    let lines: Vec<&str> = source.lines().collect();
    let mut signatures = Signatures::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = patterns.source.captures(line) {
            let target = caps[1].to_string();
            if !signatures.imports.contains(&target) {
                signatures.imports.push(target);
            }
        }

        let Some(caps) = patterns.function.captures(line) else {
            i += 1;
            continue;
        };
        let Some(name) = caps.name("kw").or_else(|| caps.name("name")) else {
            i += 1;
            continue;
        };
        let name = name.as_str().to_string();

        let end = body_end(&lines, i);
        let calls = lines[i + 1..end.min(lines.len())]
            .iter()
            .flat_map(|l| command_words(l, &patterns.command))
            .collect();

        signatures.functions.insert(
            name.clone(),
            FunctionSig {
                line: i + 1,
                signature: format!("{}()", name),
                calls: normalize_calls(calls, &name),
                doc: comment_above(&lines, i),
            },
        );
        i = end + 1;
    }

    Ok(signatures)
}

/// Index of the line closing the function that starts at `start`
fn body_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(start) {
        let code = line.split(" #").next().unwrap_or(line);
        for c in code.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return idx;
        }
    }

    lines.len()
}

/// Leading command word of each statement on a line
fn command_words(line: &str, command: &Regex) -> Vec<String> {
    let code = line.trim();
    if code.starts_with('#') {
        return Vec::new();
    }

    code.split([';', '|', '&', '(', '{', '}', '`'])
        .filter_map(|stmt| stmt.split_whitespace().find(|w| !w.contains('=')))
        .filter(|w| command.is_match(w) && !KEYWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Text of the `#` comment block directly above a definition
fn comment_above(lines: &[&str], idx: usize) -> Option<String> {
    let mut doc = None;
    let mut i = idx;
    while i > 0 {
        let prev = lines[i - 1].trim();
        if !prev.starts_with('#') || prev.starts_with("#!") {
            break;
        }
        let text = prev.trim_start_matches('#').trim();
        if !text.is_empty() {
            doc = Some(text.to_string());
        }
        i -= 1;
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let source = r#"#!/usr/bin/env bash
source ./lib/common.sh
. "$HOME/.profile"

# Build the release artifacts
build() {
    local target="$1"
    clean_dir dist
    cargo build --release && package "$target"
}

function clean_dir {
    rm -rf "$1"
}
"#;

        let sig = parse(source).unwrap();
        assert_eq!(sig.imports, vec!["./lib/common.sh", "$HOME/.profile"]);
        assert_eq!(sig.functions.len(), 2);

        let build = &sig.functions["build"];
        assert_eq!(build.line, 6);
        assert_eq!(build.signature, "build()");
        assert_eq!(build.doc.as_deref(), Some("Build the release artifacts"));
        assert_eq!(build.calls, vec!["cargo", "clean_dir", "package"]);

        assert_eq!(sig.functions["clean_dir"].calls, vec!["rm"]);
    }
}

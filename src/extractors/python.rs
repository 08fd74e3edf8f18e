//! Python signature extractor using Tree-sitter
//!
//! Extracts:
//! - Functions (def, async def), decorated or not
//! - Classes with their base classes and methods
//! - `import` and `from ... import` statements
//! - Docstrings (first line) and calls made inside each function

use anyhow::{Context, Result};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use super::{collapse_whitespace, normalize_calls, Extractor};
use crate::models::{ClassSig, FunctionSig, Language, Signatures};

pub struct PythonExtractor;

impl Extractor for PythonExtractor {
    fn languages(&self) -> &[Language] {
        &[Language::Python]
    }

    fn extract(&self, source: &str) -> Result<Signatures> {
        parse(source)
    }
}

/// Parse Python source code and extract signatures
pub fn parse(source: &str) -> Result<Signatures> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();

    parser
        .set_language(&language)
        .context("Failed to set Python language")?;

    let tree = parser
        .parse(source, None)
        .context("Failed to parse Python source")?;

    let root_node = tree.root_node();
    let mut signatures = Signatures::default();

    extract_classes(source, &root_node, &language, &mut signatures)?;
    extract_functions(source, &root_node, &language, &mut signatures)?;
    extract_imports(source, &root_node, &language, &mut signatures)?;

    Ok(signatures)
}

/// Extract class definitions and their bases
fn extract_classes(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        (class_definition
            name: (identifier) @name) @class
    "#;

    let query = Query::new(language, query_str).context("Failed to create class query")?;
    let name_idx = capture_index(&query, "name")?;
    let class_idx = capture_index(&query, "class")?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, *root, source.as_bytes());

    while let Some(match_) = matches.next() {
        let name = match_.captures.iter().find(|c| c.index == name_idx);
        let class = match_.captures.iter().find(|c| c.index == class_idx);
        let (Some(name), Some(class)) = (name, class) else {
            continue;
        };

        if inside_function(&class.node) {
            continue;
        }

        let class_node = class.node;
        signatures.classes.insert(
            node_text(&name.node, source).to_string(),
            ClassSig {
                line: class_node.start_position().row + 1,
                bases: base_classes(&class_node, source),
                methods: Default::default(),
                doc: docstring(&class_node, source),
            },
        );
    }

    Ok(())
}

/// Extract functions and methods
fn extract_functions(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        (function_definition
            name: (identifier) @name) @function
    "#;

    let query = Query::new(language, query_str).context("Failed to create function query")?;
    let calls_query = Query::new(language, "(call function: (_) @callee)")
        .context("Failed to create call query")?;
    let name_idx = capture_index(&query, "name")?;
    let func_idx = capture_index(&query, "function")?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, *root, source.as_bytes());

    while let Some(match_) = matches.next() {
        let name = match_.captures.iter().find(|c| c.index == name_idx);
        let func = match_.captures.iter().find(|c| c.index == func_idx);
        let (Some(name), Some(func)) = (name, func) else {
            continue;
        };

        let func_node = func.node;
        if inside_function(&func_node) {
            continue;
        }

        let name = node_text(&name.node, source).to_string();
        let sig = FunctionSig {
            line: func_node.start_position().row + 1,
            signature: signature_text(&func_node, source),
            calls: normalize_calls(collect_calls(&func_node, source, &calls_query), &name),
            doc: docstring(&func_node, source),
        };

        match owning_class(&func_node, source) {
            Some(class_name) => {
                let class = signatures.classes.entry(class_name).or_default();
                class.methods.insert(name, sig);
            }
            None => {
                signatures.functions.insert(name, sig);
            }
        }
    }

    Ok(())
}

/// Extract import targets as written
fn extract_imports(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        [
            (import_statement name: (dotted_name) @module)
            (import_statement name: (aliased_import name: (dotted_name) @module))
            (import_from_statement module_name: (_) @module)
        ]
    "#;

    let query = Query::new(language, query_str).context("Failed to create import query")?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, *root, source.as_bytes());

    while let Some(match_) = matches.next() {
        for capture in match_.captures {
            let module = collapse_whitespace(node_text(&capture.node, source));
            if !module.is_empty() && !signatures.imports.contains(&module) {
                signatures.imports.push(module);
            }
        }
    }

    Ok(())
}

/// Enclosing class of a method, looking through decorators
fn owning_class(func_node: &Node, source: &str) -> Option<String> {
    let mut node = func_node.parent()?;
    if node.kind() == "decorated_definition" {
        node = node.parent()?;
    }
    if node.kind() != "block" {
        return None;
    }
    let class = node.parent()?;
    if class.kind() != "class_definition" {
        return None;
    }
    class
        .child_by_field_name("name")
        .map(|n| node_text(&n, source).to_string())
}

fn inside_function(node: &Node) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "function_definition" || parent.kind() == "lambda" {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn base_classes(class_node: &Node, source: &str) -> Vec<String> {
    let Some(args) = class_node.child_by_field_name("superclasses") else {
        return Vec::new();
    };

    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|arg| arg.kind() != "keyword_argument" && arg.kind() != "comment")
        .map(|arg| collapse_whitespace(node_text(&arg, source)))
        .collect()
}

fn collect_calls(func_node: &Node, source: &str, calls_query: &Query) -> Vec<String> {
    let mut calls = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(calls_query, *func_node, source.as_bytes());

    while let Some(match_) = matches.next() {
        for capture in match_.captures {
            let callee = capture.node;
            let name = match callee.kind() {
                "identifier" => Some(node_text(&callee, source).to_string()),
                "attribute" => callee
                    .child_by_field_name("attribute")
                    .map(|a| node_text(&a, source).to_string()),
                _ => None,
            };
            if let Some(name) = name {
                calls.push(name);
            }
        }
    }

    calls
}

/// `def` line up to the body, without the trailing colon
fn signature_text(node: &Node, source: &str) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let text = collapse_whitespace(&source[node.start_byte()..end]);
    text.trim_end().trim_end_matches(':').trim_end().to_string()
}

/// First non-empty line of a function or class docstring
fn docstring(node: &Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }

    let raw = node_text(&string, source)
        .trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B'))
        .trim_matches(|c| c == '"' || c == '\'');

    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn capture_index(query: &Query, name: &str) -> Result<u32> {
    query
        .capture_index_for_name(name)
        .with_context(|| format!("query has no @{} capture", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_functions() {
        let source = r#"
def hello(name: str) -> str:
    """Say hello.

    Longer description.
    """
    return greet(name).strip()

async def fetch(url):
    pass

def greet(name):
    def inner():
        return 1
    return "hi " + name
"#;

        let sig = parse(source).unwrap();
        assert_eq!(sig.functions.len(), 3);

        let hello = &sig.functions["hello"];
        assert_eq!(hello.signature, "def hello(name: str) -> str");
        assert_eq!(hello.doc.as_deref(), Some("Say hello."));
        assert_eq!(hello.calls, vec!["greet", "strip"]);
        assert_eq!(hello.line, 2);

        assert_eq!(sig.functions["fetch"].signature, "async def fetch(url)");
        assert!(!sig.functions.contains_key("inner"));
    }

    #[test]
    fn test_parse_classes() {
        let source = r#"
class Base:
    pass

class User(Base, metaclass=Meta):
    '''A user account.'''

    def __init__(self, name):
        self.name = name
        self.validate()

    @property
    def display(self):
        return self.name.title()

    def validate(self):
        pass
"#;

        let sig = parse(source).unwrap();
        assert!(sig.functions.is_empty());

        let user = &sig.classes["User"];
        assert_eq!(user.bases, vec!["Base"]);
        assert_eq!(user.doc.as_deref(), Some("A user account."));
        assert_eq!(user.methods.len(), 3);
        assert_eq!(user.methods["__init__"].calls, vec!["validate"]);
        assert!(user.methods.contains_key("display"));
        assert_eq!(sig.function_count(), 3);
    }

    #[test]
    fn test_parse_imports() {
        let source = r#"
import os
import numpy as np
from collections import OrderedDict
from .utils import helper
from . import sibling
"#;

        let sig = parse(source).unwrap();
        assert_eq!(sig.imports, vec!["os", "numpy", "collections", ".utils", "."]);
    }
}

//! Rust signature extractor using Tree-sitter
//!
//! Extracts:
//! - Free functions (fn)
//! - Structs, enums and traits as class-like types
//! - Impl and trait methods, attached to their owning type
//! - Trait impls (recorded as bases of the implementing type)
//! - `use` declarations, `extern crate` and file-backed `mod` items as imports
//! - Calls made inside each function body

use anyhow::{Context, Result};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use super::{collapse_whitespace, normalize_calls, Extractor};
use crate::models::{ClassSig, FunctionSig, Language, Signatures};

pub struct RustExtractor;

impl Extractor for RustExtractor {
    fn languages(&self) -> &[Language] {
        &[Language::Rust]
    }

    fn extract(&self, source: &str) -> Result<Signatures> {
        parse(source)
    }
}

/// Parse Rust source code and extract signatures
pub fn parse(source: &str) -> Result<Signatures> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_rust::LANGUAGE.into();

    parser
        .set_language(&language)
        .context("Failed to set Rust language")?;

    let tree = parser
        .parse(source, None)
        .context("Failed to parse Rust source")?;

    let root_node = tree.root_node();
    let mut signatures = Signatures::default();

    extract_types(source, &root_node, &language, &mut signatures)?;
    extract_functions(source, &root_node, &language, &mut signatures)?;
    extract_imports(source, &root_node, &language, &mut signatures)?;

    Ok(signatures)
}

/// Extract struct, enum and trait definitions
fn extract_types(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        [
            (struct_item name: (type_identifier) @name)
            (enum_item name: (type_identifier) @name)
            (trait_item name: (type_identifier) @name)
        ] @class
    "#;

    let query = Query::new(language, query_str).context("Failed to create type query")?;
    let name_idx = capture_index(&query, "name")?;
    let class_idx = capture_index(&query, "class")?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, *root, source.as_bytes());

    while let Some(match_) = matches.next() {
        let name = match_.captures.iter().find(|c| c.index == name_idx);
        let node = match_.captures.iter().find(|c| c.index == class_idx);

        if let (Some(name), Some(node)) = (name, node) {
            let name = node_text(&name.node, source).to_string();
            signatures.classes.entry(name).or_insert_with(|| ClassSig {
                line: node.node.start_position().row + 1,
                bases: Vec::new(),
                methods: Default::default(),
                doc: doc_comment(&node.node, source),
            });
        }
    }

    Ok(())
}

/// Extract functions and methods, including trait method signatures
fn extract_functions(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        [
            (function_item name: (identifier) @name)
            (function_signature_item name: (identifier) @name)
        ] @function
    "#;

    let query = Query::new(language, query_str).context("Failed to create function query")?;
    let calls_query = Query::new(language, "(call_expression function: (_) @callee)")
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
        let name = node_text(&name.node, source).to_string();

        let owner = function_owner(&func_node, source);
        if matches!(owner, Owner::Nested) {
            continue;
        }

        let sig = FunctionSig {
            line: func_node.start_position().row + 1,
            signature: signature_text(&func_node, source),
            calls: normalize_calls(collect_calls(&func_node, source, &calls_query), &name),
            doc: doc_comment(&func_node, source),
        };

        match owner {
            Owner::Free => {
                signatures.functions.insert(name, sig);
            }
            Owner::Type { name: type_name, trait_name, line } => {
                let class = signatures.classes.entry(type_name).or_insert_with(|| ClassSig {
                    line,
                    ..Default::default()
                });
                if let Some(trait_name) = trait_name {
                    if !class.bases.contains(&trait_name) {
                        class.bases.push(trait_name);
                    }
                }
                class.methods.insert(name, sig);
            }
            Owner::Nested => {}
        }
    }

    Ok(())
}

/// Extract `use` declarations, `extern crate` and file-backed `mod` items
fn extract_imports(
    source: &str,
    root: &Node,
    language: &tree_sitter::Language,
    signatures: &mut Signatures,
) -> Result<()> {
    let query_str = r#"
        [
            (use_declaration argument: (_) @path)
            (extern_crate_declaration name: (identifier) @path)
            (mod_item name: (identifier) @path) @mod
        ]
    "#;

    let query = Query::new(language, query_str).context("Failed to create import query")?;
    let path_idx = capture_index(&query, "path")?;
    let mod_idx = capture_index(&query, "mod")?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, *root, source.as_bytes());

    while let Some(match_) = matches.next() {
        // Inline `mod name { ... }` blocks are not dependencies
        if let Some(module) = match_.captures.iter().find(|c| c.index == mod_idx) {
            if module.node.child_by_field_name("body").is_some() {
                continue;
            }
        }

        if let Some(path) = match_.captures.iter().find(|c| c.index == path_idx) {
            let import = collapse_whitespace(node_text(&path.node, source));
            if !signatures.imports.contains(&import) {
                signatures.imports.push(import);
            }
        }
    }

    Ok(())
}

enum Owner {
    Free,
    Type {
        name: String,
        trait_name: Option<String>,
        line: usize,
    },
    Nested,
}

/// Decide whether a function is free, a method of a type, or nested in another function
fn function_owner(node: &Node, source: &str) -> Owner {
    let mut current = node.parent();

    while let Some(parent) = current {
        match parent.kind() {
            "impl_item" => {
                let type_name = parent
                    .child_by_field_name("type")
                    .map(|t| strip_generics(node_text(&t, source)))
                    .unwrap_or_default();
                let trait_name = parent
                    .child_by_field_name("trait")
                    .map(|t| strip_generics(node_text(&t, source)));
                return Owner::Type {
                    name: type_name,
                    trait_name,
                    line: parent.start_position().row + 1,
                };
            }
            "trait_item" => {
                let name = parent
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string())
                    .unwrap_or_default();
                return Owner::Type {
                    name,
                    trait_name: None,
                    line: parent.start_position().row + 1,
                };
            }
            "function_item" | "closure_expression" => return Owner::Nested,
            _ => current = parent.parent(),
        }
    }

    Owner::Free
}

/// Names called within a function body
fn collect_calls(func_node: &Node, source: &str, calls_query: &Query) -> Vec<String> {
    let mut calls = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(calls_query, *func_node, source.as_bytes());

    while let Some(match_) = matches.next() {
        for capture in match_.captures {
            if let Some(name) = callee_name(&capture.node, source) {
                calls.push(name);
            }
        }
    }

    calls
}

fn callee_name(node: &Node, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "field_expression" => node
            .child_by_field_name("field")
            .map(|f| node_text(&f, source).to_string()),
        "scoped_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(&n, source).to_string()),
        "generic_function" => node
            .child_by_field_name("function")
            .and_then(|f| callee_name(&f, source)),
        _ => None,
    }
}

/// Declaration text up to the body
fn signature_text(node: &Node, source: &str) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let text = &source[node.start_byte()..end];
    collapse_whitespace(text).trim_end_matches(';').trim().to_string()
}

/// First non-empty line of the `///` comment block above a node
fn doc_comment(node: &Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => {}
            "line_comment" => match node_text(&sibling, source).strip_prefix("///") {
                Some(rest) => lines.push(rest.trim().to_string()),
                None => break,
            },
            _ => break,
        }
        current = sibling.prev_sibling();
    }

    lines.reverse();
    lines.into_iter().find(|l| !l.is_empty())
}

fn strip_generics(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
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
    fn test_parse_function() {
        let source = r#"
            /// Greets the world
            pub fn hello_world() {
                println!("hi");
                helper(1);
            }

            fn helper(x: i32) -> i32 { x }
        "#;

        let sig = parse(source).unwrap();
        assert_eq!(sig.functions.len(), 2);

        let hello = &sig.functions["hello_world"];
        assert_eq!(hello.signature, "pub fn hello_world()");
        assert_eq!(hello.doc.as_deref(), Some("Greets the world"));
        assert_eq!(hello.calls, vec!["helper"]);
        assert_eq!(sig.functions["helper"].signature, "fn helper(x: i32) -> i32");
    }

    #[test]
    fn test_parse_impl() {
        let source = r#"
            struct User {
                name: String,
            }

            impl User {
                fn new(name: String) -> Self {
                    User { name }
                }

                fn get_name(&self) -> &str {
                    self.name.as_str()
                }
            }

            impl std::fmt::Display for User {
                fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                    write!(f, "{}", self.get_name())
                }
            }
        "#;

        let sig = parse(source).unwrap();
        assert!(sig.functions.is_empty());

        let user = &sig.classes["User"];
        assert_eq!(user.methods.len(), 3);
        assert!(user.methods.contains_key("new"));
        assert_eq!(user.methods["get_name"].calls, vec!["as_str"]);
        assert_eq!(user.bases, vec!["std::fmt::Display"]);
        assert_eq!(sig.function_count(), 3);
    }

    #[test]
    fn test_parse_trait_and_enum() {
        let source = r#"
            enum Status { Active, Inactive }

            trait Drawable {
                fn draw(&self);
            }
        "#;

        let sig = parse(source).unwrap();
        assert!(sig.classes.contains_key("Status"));
        assert_eq!(sig.classes["Drawable"].methods["draw"].signature, "fn draw(&self)");
    }

    #[test]
    fn test_parse_imports() {
        let source = r#"
            use std::collections::HashMap;
            use crate::models::{Language, Signatures};
            extern crate serde;
            mod parser;
            mod inline { fn x() {} }
        "#;

        let sig = parse(source).unwrap();
        assert_eq!(
            sig.imports,
            vec![
                "std::collections::HashMap",
                "crate::models::{Language, Signatures}",
                "serde",
                "parser",
            ]
        );
    }

    #[test]
    fn test_nested_functions_skipped() {
        let source = r#"
            fn outer() {
                fn inner() {}
                inner();
            }
        "#;

        let sig = parse(source).unwrap();
        assert_eq!(sig.functions.len(), 1);
        assert_eq!(sig.functions["outer"].calls, vec!["inner"]);
    }
}

//! Signature extractors for each supported language
//!
//! An extractor turns file text into `Signatures` (functions, classes,
//! imports, and the names each function calls). Extraction is heuristic and
//! best-effort; a failure only downgrades the file to "listed only".
//!
//! Rust and Python use Tree-sitter grammars; JavaScript/TypeScript and shell
//! use line-oriented regex scanners.

pub mod javascript;
pub mod python;
pub mod rust;
pub mod shell;

use anyhow::Result;
use std::collections::HashMap;

use crate::models::{Language, Signatures};

/// Capability interface implemented once per language
pub trait Extractor: Send + Sync {
    /// Languages served by this extractor
    fn languages(&self) -> &[Language];

    /// Extract signatures from file contents
    fn extract(&self, source: &str) -> Result<Signatures>;
}

/// Lookup table from language tag to extractor
pub struct ExtractorRegistry {
    extractors: HashMap<Language, std::sync::Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Empty registry; every file will be listed only
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with every built-in extractor
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(rust::RustExtractor);
        registry.register(python::PythonExtractor);
        registry.register(javascript::JavaScriptExtractor);
        registry.register(shell::ShellExtractor);
        registry
    }

    /// Add an extractor for all of its languages, replacing earlier ones
    pub fn register(&mut self, extractor: impl Extractor + 'static) {
        let extractor: std::sync::Arc<dyn Extractor> = std::sync::Arc::new(extractor);
        for lang in extractor.languages() {
            self.extractors.insert(*lang, std::sync::Arc::clone(&extractor));
        }
    }

    pub fn get(&self, language: Language) -> Option<&dyn Extractor> {
        self.extractors.get(&language).map(|e| e.as_ref())
    }

    pub fn supports(&self, language: Language) -> bool {
        self.extractors.contains_key(&language)
    }

    /// Extract with the registered extractor; `Ok(None)` if there is none
    pub fn extract(&self, language: Language, source: &str) -> Result<Option<Signatures>> {
        match self.get(language) {
            Some(extractor) => extractor.extract(source).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Collapse runs of whitespace into single spaces
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sort and de-duplicate call names, dropping the caller itself
pub(crate) fn normalize_calls(mut calls: Vec<String>, own_name: &str) -> Vec<String> {
    calls.retain(|c| !c.is_empty() && c != own_name);
    calls.sort();
    calls.dedup();
    calls
}

/// 1-indexed line number of a byte offset
pub(crate) fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor;

    impl Extractor for FixedExtractor {
        fn languages(&self) -> &[Language] {
            &[Language::Shell]
        }

        fn extract(&self, _source: &str) -> Result<Signatures> {
            let mut sig = Signatures::default();
            sig.imports.push("fixed".to_string());
            Ok(sig)
        }
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.supports(Language::Rust));
        assert!(registry.supports(Language::TypeScript));
        assert!(!registry.supports(Language::Markdown));
        assert!(registry.extract(Language::Markdown, "# doc").unwrap().is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(FixedExtractor);
        let sig = registry.extract(Language::Shell, "foo() { :; }").unwrap().unwrap();
        assert_eq!(sig.imports, vec!["fixed"]);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(collapse_whitespace("fn  a(\n  x: i32\n)"), "fn a( x: i32 )");
        assert_eq!(
            normalize_calls(vec!["b".into(), "a".into(), "b".into(), "me".into()], "me"),
            vec!["a", "b"]
        );
        assert_eq!(line_of("a\nb\nc", 4), 3);
    }
}

//! Core data models for the project index
//!
//! These structures are the on-disk format consumed by agents: one compact
//! Core Index (`PROJECT_INDEX.json`), one Detail Shard per module
//! (`PROJECT_INDEX.d/<module_id>.json`), and the legacy single-file layout
//! that `--migrate` converts from.
//!
//! Every map is a `BTreeMap` so serialization is deterministic: building the
//! same tree twice must produce byte-identical shards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};

/// Format tag of the split Core Index
pub const SPLIT_VERSION: &str = "2.0-split";
/// Format tag of the legacy single-file index
pub const LEGACY_VERSION: &str = "1.0";
/// Format tag written into every Detail Shard
pub const SHARD_VERSION: &str = "2.0";

/// A `[caller, callee]` call-graph edge
pub type CallEdge = (String, String);

/// Programming or documentation language of an indexed file
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Shell,
    Markdown,
}

impl Language {
    /// Map a file extension to a language; `None` means "not indexable"
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" | "tsx" => Some(Language::TypeScript),
            "sh" | "bash" | "zsh" => Some(Language::Shell),
            "md" | "markdown" | "rst" | "adoc" => Some(Language::Markdown),
            _ => None,
        }
    }

    /// Detect the language of a path from its extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = std::path::Path::new(path).extension()?.to_str()?;
        Self::from_extension(ext)
    }

    /// Documentation files are classified into tiers instead of extracted
    pub fn is_doc(&self) -> bool {
        matches!(self, Language::Markdown)
    }
}

/// Documentation tier; only `Critical` is kept in the Core Index by default
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocTier {
    Critical,
    Standard,
    Archive,
}

/// Signature of a function or method
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FunctionSig {
    /// 1-indexed line of the definition
    pub line: usize,
    /// Declaration text up to the body, whitespace-collapsed
    pub signature: String,
    /// Names called from the body (sorted, de-duplicated)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<String>,
    /// First line of the doc comment / docstring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Signature of a class-like type (class, struct, enum, trait)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClassSig {
    pub line: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, FunctionSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Raw extractor output for one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Signatures {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, FunctionSig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub classes: BTreeMap<String, ClassSig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

impl Signatures {
    /// Functions plus methods
    pub fn function_count(&self) -> usize {
        self.functions.len()
            + self
                .classes
                .values()
                .map(|c| c.methods.len())
                .sum::<usize>()
    }

    /// Every callable with its qualified caller name (`fn` or `Class.method`)
    pub fn callables(&self) -> Vec<(String, &FunctionSig)> {
        let mut out: Vec<(String, &FunctionSig)> = self
            .functions
            .iter()
            .map(|(name, sig)| (name.clone(), sig))
            .collect();
        for (class, sig) in &self.classes {
            for (method, msig) in &sig.methods {
                out.push((format!("{}.{}", class, method), msig));
            }
        }
        out
    }

    /// Bare names this file defines (functions, methods and classes)
    pub fn defined_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.functions.keys().cloned().collect();
        for (class, sig) in &self.classes {
            names.insert(class.clone());
            for method in sig.methods.keys() {
                names.insert(method.clone());
                names.insert(format!("{}.{}", class, method));
            }
        }
        names
    }
}

/// Most recent commit touching a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitInfo {
    pub commit: String,
    pub author: String,
    /// RFC 3339 commit date
    pub date: String,
}

/// Per-file detail stored in a shard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDetail {
    pub lang: Language,
    #[serde(flatten)]
    pub signatures: Signatures,
    /// Extraction failed; the file is listed but carries no signatures
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub listed_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
}

impl FileDetail {
    pub fn listed_only(lang: Language) -> Self {
        Self {
            lang,
            signatures: Signatures::default(),
            listed_only: true,
            git: None,
        }
    }
}

/// Summary of a documentation file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<String>,
}

/// Where the file list came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileSource {
    #[default]
    Git,
    Walk,
}

/// Aggregate counts shown in the Core Index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_dirs: usize,
    pub files_by_language: BTreeMap<String, usize>,
    pub doc_tiers: BTreeMap<String, usize>,
    pub file_source: FileSource,
    #[serde(default)]
    pub listed_only: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Entry of the `modules` map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ModuleEntry {
    pub file_count: usize,
    pub function_count: usize,
    pub detail_path: String,
    pub files: Vec<String>,
}

/// The always-loaded summary of the whole project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreIndex {
    pub version: String,
    pub at: String,
    pub root: String,
    pub tree: Vec<String>,
    pub stats: IndexStats,
    pub modules: BTreeMap<String, ModuleEntry>,
    /// Older indices may lack the map; readers fall back to `modules`
    #[serde(default)]
    pub file_to_module_map: BTreeMap<String, String>,
    #[serde(default)]
    pub module_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub d_critical: BTreeMap<String, DocSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d_standard: Option<BTreeMap<String, DocSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d_archive: Option<BTreeMap<String, DocSummary>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority_modules: Vec<String>,
}

impl CoreIndex {
    /// Resolve a file to its owning module
    pub fn module_for_file(&self, path: &str) -> Option<&str> {
        if !self.file_to_module_map.is_empty() {
            return self.file_to_module_map.get(path).map(String::as_str);
        }
        self.modules
            .iter()
            .find(|(_, entry)| entry.files.iter().any(|f| f == path))
            .map(|(id, _)| id.as_str())
    }

    /// Check that `file_to_module_map` is the exact inverse of `modules`
    ///
    /// Returns one human-readable line per violation; empty means consistent.
    /// Older indices without a map only have `modules` itself checked.
    pub fn partition_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        let has_map = !self.file_to_module_map.is_empty();

        for (id, entry) in &self.modules {
            if entry.file_count != entry.files.len() {
                problems.push(format!(
                    "module '{}' reports {} files but lists {}",
                    id,
                    entry.file_count,
                    entry.files.len()
                ));
            }
            for file in &entry.files {
                if let Some(other) = seen.insert(file, id) {
                    problems.push(format!("file '{}' is in modules '{}' and '{}'", file, other, id));
                }
                if !has_map {
                    continue;
                }
                match self.file_to_module_map.get(file) {
                    Some(mapped) if mapped == id => {}
                    Some(mapped) => problems.push(format!(
                        "file '{}' maps to '{}' but is listed under '{}'",
                        file, mapped, id
                    )),
                    None => problems.push(format!("file '{}' missing from file_to_module_map", file)),
                }
            }
        }

        for (file, id) in &self.file_to_module_map {
            if !seen.contains_key(file.as_str()) {
                problems.push(format!("map entry '{}' -> '{}' has no module listing", file, id));
            }
        }

        problems
    }

    /// All indexed files, sorted
    pub fn all_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .modules
            .values()
            .flat_map(|entry| entry.files.iter().cloned())
            .collect();
        files.sort();
        files
    }
}

/// Per-module detail document, loaded on demand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailShard {
    pub module_id: String,
    pub version: String,
    pub files: BTreeMap<String, FileDetail>,
    #[serde(default)]
    pub call_graph_local: Vec<CallEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_graph_external: Vec<CallEdge>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub doc_standard: BTreeMap<String, DocSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub doc_archive: BTreeMap<String, DocSummary>,
}

impl DetailShard {
    /// Every edge of this shard, local first
    pub fn all_edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.call_graph_local.iter().chain(self.call_graph_external.iter())
    }
}

/// Legacy single-file index (`mode = single`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyIndex {
    pub version: String,
    pub at: String,
    pub root: String,
    pub tree: Vec<String>,
    pub stats: IndexStats,
    pub files: BTreeMap<String, FileDetail>,
    #[serde(default)]
    pub call_graph: Vec<CallEdge>,
    #[serde(default)]
    pub docs: BTreeMap<DocTier, BTreeMap<String, DocSummary>>,
}

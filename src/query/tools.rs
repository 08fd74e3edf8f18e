//! Read-only query operations for agents
//!
//! Each operation returns a JSON string. Failures become
//! `{"error": "..."}` so the caller never has to handle an `Err`.

use globset::{Glob, GlobMatcher};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::query::loader::LazyLoader;

/// Default cap on `search_files` results
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
struct FileMatch {
    path: String,
    module: String,
}

/// The four agent-facing operations over one project's index
pub struct QueryTools {
    loader: LazyLoader,
}

impl QueryTools {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            loader: LazyLoader::new(root),
        }
    }

    pub fn load_core_index(&mut self) -> String {
        respond(self.loader.load_core().and_then(|core| to_value(core.as_ref())))
    }

    pub fn load_detail(&mut self, module_id: &str) -> String {
        respond(
            self.loader
                .load_module(module_id)
                .and_then(|shard| to_value(shard.as_ref())),
        )
    }

    /// Paths containing `pattern`, or matching it as a glob when it has `*`/`?`
    pub fn search_files(&mut self, pattern: &str, limit: Option<usize>) -> String {
        respond(self.search(pattern, limit.unwrap_or(DEFAULT_SEARCH_LIMIT)))
    }

    /// Signatures, module and git metadata of one file
    pub fn get_file_info(&mut self, path: &str) -> String {
        respond(self.file_info(path))
    }

    fn search(&mut self, pattern: &str, limit: usize) -> Result<Value> {
        let core = self.loader.load_core()?;
        let matcher = FileMatcher::new(pattern);

        let mut matches: Vec<FileMatch> = core
            .modules
            .iter()
            .flat_map(|(id, entry)| {
                entry
                    .files
                    .iter()
                    .filter(|p| matcher.is_match(p))
                    .map(move |path| FileMatch {
                        path: path.clone(),
                        module: id.clone(),
                    })
            })
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        let total = matches.len();
        matches.truncate(limit);

        Ok(json!({
            "pattern": pattern,
            "matches": matches,
            "total": total,
            "truncated": total > matches.len(),
        }))
    }

    fn file_info(&mut self, path: &str) -> Result<Value> {
        let path = path.trim_start_matches("./");
        let core = self.loader.load_core()?;
        let module_id = core
            .module_for_file(path)
            .ok_or_else(|| IndexError::NotFound {
                kind: "file",
                name: path.to_string(),
            })?
            .to_string();

        let mut info = json!({
            "path": path,
            "module": module_id,
        });

        if let Some(summary) = core.d_critical.get(path) {
            info["doc"] = to_value(summary)?;
            info["doc_tier"] = json!("critical");
        }

        let shard = self.loader.load_module(&module_id)?;
        if let Some(detail) = shard.files.get(path) {
            if let Value::Object(fields) = to_value(detail)? {
                for (key, value) in fields {
                    info[key] = value;
                }
            }
        }
        for (tier, docs) in [("standard", &shard.doc_standard), ("archive", &shard.doc_archive)] {
            if let Some(summary) = docs.get(path) {
                info["doc"] = to_value(summary)?;
                info["doc_tier"] = json!(tier);
            }
        }

        Ok(info)
    }
}

/// Substring or glob matcher over relative paths
enum FileMatcher {
    Substring(String),
    Glob(GlobMatcher),
}

impl FileMatcher {
    fn new(pattern: &str) -> Self {
        if pattern.contains(['*', '?']) {
            match Glob::new(pattern) {
                Ok(glob) => return FileMatcher::Glob(glob.compile_matcher()),
                Err(e) => log::debug!("Invalid glob '{}', using substring match: {}", pattern, e),
            }
        }
        FileMatcher::Substring(pattern.to_lowercase())
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            FileMatcher::Substring(needle) => path.to_lowercase().contains(needle.as_str()),
            FileMatcher::Glob(glob) => glob.is_match(path),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| IndexError::Malformed {
        what: "response".to_string(),
        source,
    })
}

fn respond(result: Result<Value>) -> String {
    let value = result.unwrap_or_else(|e| json!({ "error": e.to_string() }));
    serde_json::to_string(&value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src/auth")).unwrap();
        std::fs::write(root.join("src/auth/login.py"), "def login(user):\n    validate(user)\n").unwrap();
        std::fs::write(root.join("src/auth/session.py"), "class Session:\n    pass\n").unwrap();
        std::fs::write(root.join("README.md"), "# Demo\n## Usage\n").unwrap();
        crate::indexer::build(root, &IndexConfig::default()).unwrap();
        temp
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_search_substring_and_glob() {
        let temp = project();
        let mut tools = QueryTools::new(temp.path());

        let result = parse(&tools.search_files("LOGIN", None));
        assert_eq!(result["total"], 1);
        assert_eq!(result["matches"][0]["path"], "src/auth/login.py");
        assert_eq!(result["matches"][0]["module"], "src");

        let result = parse(&tools.search_files("src/**/*.py", Some(1)));
        assert_eq!(result["total"], 2);
        assert_eq!(result["matches"].as_array().unwrap().len(), 1);
        assert_eq!(result["truncated"], true);
    }

    #[test]
    fn test_search_limit_keeps_first_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        // Module "b" sorts before "root" but its path sorts after "a.py"
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("b/x.py"), "def x():\n    pass\n").unwrap();
        std::fs::write(root.join("a.py"), "def a():\n    pass\n").unwrap();
        crate::indexer::build(root, &IndexConfig::default()).unwrap();
        let mut tools = QueryTools::new(root);

        let result = parse(&tools.search_files(".py", Some(1)));
        assert_eq!(result["total"], 2);
        assert_eq!(result["truncated"], true);
        assert_eq!(result["matches"][0]["path"], "a.py");
        assert_eq!(result["matches"][0]["module"], "root");
    }

    #[test]
    fn test_get_file_info() {
        let temp = project();
        let mut tools = QueryTools::new(temp.path());

        let info = parse(&tools.get_file_info("src/auth/login.py"));
        assert_eq!(info["module"], "src");
        assert_eq!(info["lang"], "python");
        assert_eq!(info["functions"]["login"]["calls"][0], "validate");

        let readme = parse(&tools.get_file_info("README.md"));
        assert_eq!(readme["doc_tier"], "critical");
        assert_eq!(readme["doc"]["title"], "Demo");

        let missing = parse(&tools.get_file_info("nope.rs"));
        assert_eq!(missing["error"], "file 'nope.rs' not found");
    }

    #[test]
    fn test_errors_are_json() {
        let temp = TempDir::new().unwrap();
        let mut tools = QueryTools::new(temp.path());
        assert!(parse(&tools.load_core_index())["error"].is_string());

        let temp = project();
        let mut tools = QueryTools::new(temp.path());
        assert_eq!(parse(&tools.load_core_index())["version"], "2.0-split");
        assert_eq!(
            parse(&tools.load_detail("../x"))["error"],
            "invalid module name '../x' (allowed: letters, digits, '_', '-', '.')"
        );
        assert_eq!(parse(&tools.load_detail("src"))["module_id"], "src");
    }
}

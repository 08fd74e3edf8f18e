//! Module organization and recursive splitting
//!
//! Files are grouped into modules by their top-level directory. Any module
//! holding at least `threshold` files is split along its subdirectories,
//! recursively, as long as the directory looks organized (some subdirectory
//! holds at least 20% of `threshold` files). Files sitting directly in a
//! split directory go to a synthetic `<module>-root` sub-module.
//!
//! Splitting only ever refines the partition: every file belongs to exactly
//! one module before and after.

use std::collections::BTreeMap;

use crate::config::{SplitStrategy, SubmoduleConfig};

/// Module id → sorted file paths
pub type ModuleMap = BTreeMap<String, Vec<String>>;

/// Module holding files that sit at the repository root
pub const ROOT_MODULE: &str = "root";

/// Suffix of the sub-module collecting a split directory's own files
const ROOT_SUFFIX: &str = "root";

/// Turn a path component into a module id: `[A-Za-z0-9_.-]`, no leading dot
pub fn sanitize_module_id(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Check a module id against the allowed charset
pub fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Group files by their first path component
pub fn organize(files: &[String]) -> ModuleMap {
    let mut modules = ModuleMap::new();

    for file in files {
        let id = match file.split_once('/') {
            Some((top, _)) => sanitize_module_id(top),
            None => ROOT_MODULE.to_string(),
        };
        modules.entry(id).or_default().push(file.clone());
    }

    for files in modules.values_mut() {
        files.sort();
        files.dedup();
    }

    modules
}

/// Modules at or above the threshold (inclusive)
pub fn detect_large(modules: &ModuleMap, threshold: usize) -> Vec<String> {
    modules
        .iter()
        .filter(|(_, files)| files.len() >= threshold)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Invert a module map; a file mapped twice keeps its last module
pub fn build_file_to_module_map(modules: &ModuleMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();

    for (id, files) in modules {
        for file in files {
            if let Some(previous) = map.insert(file.clone(), id.clone()) {
                log::warn!(
                    "File '{}' mapped to both '{}' and '{}'; keeping '{}'",
                    file,
                    previous,
                    id,
                    id
                );
            }
        }
    }

    map
}

/// Insert a module, merging file lists if the id is already taken
pub fn merge_module(modules: &mut ModuleMap, id: String, files: Vec<String>) {
    match modules.get_mut(&id) {
        Some(existing) => {
            log::warn!("Module id '{}' produced twice; merging file lists", id);
            existing.extend(files);
            existing.sort();
            existing.dedup();
        }
        None => {
            modules.insert(id, files);
        }
    }
}

/// Splitting parameters resolved from config and framework hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Organizer {
    pub enabled: bool,
    pub threshold: usize,
    pub max_depth: usize,
    /// Split without requiring an organized directory
    pub force: bool,
}

impl Organizer {
    pub fn new(config: &SubmoduleConfig, max_depth: usize) -> Self {
        Self {
            enabled: config.splitting_enabled(),
            threshold: config.threshold,
            max_depth,
            force: config.strategy == SplitStrategy::Force,
        }
    }

    /// Full module set: top-level grouping refined by splitting
    pub fn build_module_set(&self, files: &[String]) -> ModuleMap {
        let mut modules = organize(files);
        if !self.enabled {
            return modules;
        }

        for id in detect_large(&modules, self.threshold) {
            let Some(files) = modules.remove(&id) else {
                continue;
            };
            let parts = self.split(&id, 1, files, 0);
            if parts.len() > 1 {
                log::info!("Split module '{}' into {} sub-modules", id, parts.len());
            }
            for (sub_id, sub_files) in parts {
                merge_module(&mut modules, sub_id, sub_files);
            }
        }

        modules
    }

    /// Recursively split one module
    ///
    /// `prefix_len` is the number of leading path components shared by all
    /// files of the module; the next component names the subdirectory.
    pub fn split(
        &self,
        module_id: &str,
        prefix_len: usize,
        files: Vec<String>,
        current_depth: usize,
    ) -> ModuleMap {
        let mut result = ModuleMap::new();

        if current_depth >= self.max_depth || files.len() < self.threshold {
            result.insert(module_id.to_string(), files);
            return result;
        }

        let mut own_level: Vec<String> = Vec::new();
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in files {
            let components: Vec<&str> = file.split('/').collect();
            if components.len() > prefix_len + 1 {
                let child = components[prefix_len].to_string();
                buckets.entry(child).or_default().push(file);
            } else {
                own_level.push(file);
            }
        }

        // Organized: some subdirectory holds at least 20% of the threshold
        let organized = buckets.values().any(|b| b.len() * 5 >= self.threshold);
        if buckets.is_empty() || (!organized && !self.force) {
            let mut files = own_level;
            files.extend(buckets.into_values().flatten());
            files.sort();
            result.insert(module_id.to_string(), files);
            return result;
        }

        if !own_level.is_empty() {
            merge_module(&mut result, format!("{}-{}", module_id, ROOT_SUFFIX), own_level);
        }

        for (child, bucket) in buckets {
            let child_id = format!("{}-{}", module_id, sanitize_module_id(&child));
            if bucket.len() >= self.threshold {
                for (id, sub) in self.split(&child_id, prefix_len + 1, bucket, current_depth + 1) {
                    merge_module(&mut result, id, sub);
                }
            } else {
                merge_module(&mut result, child_id, bucket);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(prefix: &str, count: usize, ext: &str) -> Vec<String> {
        (0..count).map(|i| format!("{}/f{:03}.{}", prefix, i, ext)).collect()
    }

    fn organizer(threshold: usize, max_depth: usize) -> Organizer {
        Organizer {
            enabled: true,
            threshold,
            max_depth,
            force: false,
        }
    }

    fn total(modules: &ModuleMap) -> usize {
        modules.values().map(Vec::len).sum()
    }

    fn assert_partition(input: &[String], modules: &ModuleMap) {
        let map = build_file_to_module_map(modules);
        assert_eq!(map.len(), input.len());
        assert_eq!(total(modules), input.len());
        for file in input {
            let id = &map[file];
            assert!(modules[id].contains(file));
        }
    }

    #[test]
    fn test_organize_groups_by_top_level() {
        let input: Vec<String> = ["src/a.rs", "src/b/c.rs", "README.md", ".github/ci.yml", "web app/x.js"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let modules = organize(&input);

        assert_eq!(modules["src"].len(), 2);
        assert_eq!(modules[ROOT_MODULE], vec!["README.md"]);
        assert!(modules.contains_key("github"));
        assert!(modules.contains_key("web_app"));
    }

    #[test]
    fn test_detect_large_is_inclusive() {
        let mut modules = ModuleMap::new();
        modules.insert("a".into(), files("a", 100, "rs"));
        modules.insert("b".into(), files("b", 99, "rs"));
        assert_eq!(detect_large(&modules, 100), vec!["a"]);
    }

    #[test]
    fn test_split_components_and_root() {
        let mut input = files("src", 60, "ts");
        input.extend(files("src/components", 90, "tsx"));

        let modules = organizer(100, 3).build_module_set(&input);

        assert_eq!(modules.len(), 2);
        assert_eq!(modules["src-components"].len(), 90);
        assert_eq!(modules["src-root"].len(), 60);
        assert_partition(&input, &modules);
    }

    #[test]
    fn test_flat_directory_not_split() {
        let mut input = files("lib", 95, "py");
        for i in 0..10 {
            input.extend(files(&format!("lib/pkg{}", i), 1, "py"));
        }

        let modules = organizer(100, 3).build_module_set(&input);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules["lib"].len(), 105);
    }

    #[test]
    fn test_force_skips_organized_test() {
        let mut input = files("lib", 95, "py");
        for i in 0..10 {
            input.extend(files(&format!("lib/pkg{}", i), 1, "py"));
        }

        let mut org = organizer(100, 3);
        org.force = true;
        let modules = org.build_module_set(&input);

        assert_eq!(modules.len(), 11);
        assert_eq!(modules["lib-root"].len(), 95);
        assert_partition(&input, &modules);
    }

    #[test]
    fn test_recursive_split_and_depth_limit() {
        let mut input = files("app/ui/forms", 120, "js");
        input.extend(files("app/ui/widgets", 40, "js"));
        input.extend(files("app/api", 30, "js"));

        let deep = organizer(100, 3).build_module_set(&input);
        assert!(deep.contains_key("app-ui-forms"));
        assert!(deep.contains_key("app-ui-widgets"));
        assert!(deep.contains_key("app-api"));
        assert_partition(&input, &deep);

        let shallow = organizer(100, 1).build_module_set(&input);
        assert_eq!(shallow["app-ui"].len(), 160);
        assert_partition(&input, &shallow);
    }

    #[test]
    fn test_disabled_splitting() {
        let input = files("src/components", 300, "tsx");
        let mut org = organizer(100, 3);
        org.enabled = false;
        assert_eq!(org.build_module_set(&input).len(), 1);
    }

    #[test]
    fn test_split_is_deterministic() {
        let mut input = files("src", 60, "ts");
        input.extend(files("src/components", 90, "tsx"));
        let mut reversed = input.clone();
        reversed.reverse();

        let org = organizer(100, 3);
        assert_eq!(org.build_module_set(&input), org.build_module_set(&reversed));
    }

    #[test]
    fn test_colliding_ids_merge() {
        let mut input = files("src", 30, "rs");
        input.extend(files("src/root", 80, "rs"));

        let modules = organizer(100, 3).build_module_set(&input);
        assert_eq!(modules["src-root"].len(), 110);
        assert_partition(&input, &modules);
    }

    #[test]
    fn test_module_id_charset() {
        assert_eq!(sanitize_module_id("..hidden"), "hidden");
        assert_eq!(sanitize_module_id("a b/c"), "a_b_c");
        assert!(is_valid_module_id("src-components.v2"));
        assert!(!is_valid_module_id("../etc"));
        assert!(!is_valid_module_id(".git"));
        assert!(!is_valid_module_id(""));
    }
}

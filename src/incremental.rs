//! Incremental index updates
//!
//! An update starts from the split index on disk and the files git reports
//! as touched since the index's `at` timestamp:
//!
//! 1. detect changes (git is mandatory; no git means a full build)
//! 2. map changed files to modules, placing new files in the deepest
//!    existing module of their directory
//! 3. add modules importing a changed file (one hop, matched on raw import
//!    strings)
//! 4. regenerate the shards of affected modules only
//! 5. validate every shard hash and the partition
//! 6. write the Core Index, or restore the touched shards and fail
//!
//! Import matching is a path-segment heuristic: aliased or re-exported
//! imports can be missed, and unrelated imports sharing a name can match.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::IndexError;
use crate::framework;
use crate::git::Git;
use crate::indexer::{assemble_core, build_shard, resolve_root, Analysis, Indexer};
use crate::models::{CoreIndex, DetailShard, DocTier, FileSource};
use crate::organizer::{sanitize_module_id, ModuleMap, ROOT_MODULE};
use crate::signature_cache::SignatureCache;
use crate::store::IndexStore;

/// Result of an incremental run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing indexable changed; the index was not touched
    NoChanges,
    Updated {
        /// Regenerated (or removed) modules
        modules: Vec<String>,
        /// Added, modified and deleted files
        changed_files: Vec<String>,
    },
}

/// Previous shard contents, `None` for shards that did not exist
pub type ShardBackups = BTreeMap<String, Option<Vec<u8>>>;

/// Changed files split by what happened to them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Added or modified, still indexable
    pub modified: BTreeSet<String>,
    /// Previously indexed, now gone or no longer indexable
    pub removed: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn all(&self) -> BTreeSet<String> {
        self.modified.union(&self.removed).cloned().collect()
    }
}

/// Update the split index at `root` in place
///
/// Typed failures (`VersionControlUnavailable`, `IntegrityViolation`,
/// `NoIndex`, ...) are carried as [`IndexError`] inside the returned error;
/// any failure means the caller should run a full build.
pub fn update(indexer: &Indexer, root: &Path) -> Result<UpdateOutcome> {
    let root = resolve_root(root)?;
    let store = IndexStore::new(&root);
    let core = store.read_core()?;

    if core.module_hashes.is_empty() && !core.modules.is_empty() {
        return Err(IndexError::MissingFields {
            what: "core index (built without detail shards)".to_string(),
            fields: vec!["module_hashes".to_string()],
        }
        .into());
    }

    let problems = store.integrity_problems(&core);
    if !problems.is_empty() {
        return Err(IndexError::IntegrityViolation { problems }.into());
    }

    let changes = detect_changes(indexer, &root, &core)?;
    if changes.is_empty() {
        log::info!("No changes since {}", core.at);
        return Ok(UpdateOutcome::NoChanges);
    }
    log::info!(
        "{} modified and {} removed files since {}",
        changes.modified.len(),
        changes.removed.len(),
        core.at
    );

    let shards = load_all_shards(&store, &core)?;
    let base = analysis_from_index(&core, &shards);

    // Module membership after the change
    let mut modules: ModuleMap = core
        .modules
        .iter()
        .map(|(id, entry)| (id.clone(), entry.files.clone()))
        .collect();
    let mut affected: BTreeSet<String> = BTreeSet::new();

    for path in &changes.removed {
        if let Some(id) = core.module_for_file(path) {
            affected.insert(id.to_string());
            if let Some(files) = modules.get_mut(id) {
                files.retain(|f| f != path);
            }
        }
    }
    for path in &changes.modified {
        let id = match core.module_for_file(path) {
            Some(id) => id.to_string(),
            None => {
                let id = assign_module(path, &modules);
                log::debug!("New file {} assigned to module '{}'", path, id);
                let files = modules.entry(id.clone()).or_default();
                files.push(path.clone());
                files.sort();
                id
            }
        };
        affected.insert(id);
    }

    let importers = expand_importers(&reverse_import_graph(&shards), &changes.all());
    for importer in importers {
        if let Some(id) = core.module_for_file(&importer) {
            if affected.insert(id.to_string()) {
                log::debug!("Module '{}' affected through an import in {}", id, importer);
            }
        }
    }

    modules.retain(|_, files| !files.is_empty());

    // Re-extract only the changed files
    let mut cache = SignatureCache::load(&root);
    let git_info = indexer.git_metadata(&root, FileSource::Git);
    let classifier = indexer.doc_classifier();
    let modified: Vec<String> = changes.modified.iter().cloned().collect();
    let fresh = indexer.analyze(&root, &modified, &mut cache, &git_info, &classifier)?;

    let mut analysis = base;
    analysis.merge(fresh, &changes.removed);
    // Git metadata of unchanged files stays as recorded in the shards

    let mut module_hashes = core.module_hashes.clone();
    let mut backups = ShardBackups::new();
    if let Err(e) = regenerate(&store, &affected, &modules, &analysis, &mut module_hashes, &mut backups) {
        rollback(&store, &backups);
        return Err(e);
    }

    let all_files: Vec<String> = modules.values().flatten().cloned().collect();
    let detection = framework::detect(&all_files);
    let new_core = assemble_core(
        &root,
        &modules,
        &analysis,
        module_hashes,
        core.stats.file_source,
        detection.as_ref(),
        indexer.config(),
    );

    commit_or_rollback(&store, &new_core, &backups)?;

    if let Err(e) = cache.save() {
        log::warn!("Failed to save signature cache: {:#}", e);
    }

    Ok(UpdateOutcome::Updated {
        modules: affected.into_iter().collect(),
        changed_files: changes.all().into_iter().collect(),
    })
}

/// Files touched since the index was written, filtered to indexable ones
pub fn detect_changes(indexer: &Indexer, root: &Path, core: &CoreIndex) -> Result<ChangeSet> {
    let git = Git::new(root, indexer.git_timeout());
    if !git.is_repo() {
        return Err(IndexError::VersionControlUnavailable(format!(
            "{} is not a git working tree",
            root.display()
        ))
        .into());
    }

    let touched = git
        .changed_since(&core.at)
        .map_err(|e| IndexError::VersionControlUnavailable(format!("{:#}", e)))?;

    let mut changes = ChangeSet::default();
    for path in touched {
        if indexer.should_index(root, &path) {
            changes.modified.insert(path);
        } else if core.module_for_file(&path).is_some() {
            changes.removed.insert(path);
        }
    }

    // Deletions git may not report (e.g. removed untracked files)
    for path in core.all_files() {
        if !root.join(&path).exists() {
            changes.modified.remove(&path);
            changes.removed.insert(path);
        }
    }

    Ok(changes)
}

/// Module for a file the index has not seen yet
///
/// Walks the file's directory from deepest to shallowest and takes the first
/// existing module, preferring `<dir>` over `<dir>-root`. Falls back to a new
/// top-level module named after the first directory.
pub fn assign_module(path: &str, modules: &ModuleMap) -> String {
    let dirs: Vec<String> = match path.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').map(sanitize_module_id).collect(),
        None => return ROOT_MODULE.to_string(),
    };

    for depth in (1..=dirs.len()).rev() {
        let id = dirs[..depth].join("-");
        if modules.contains_key(&id) {
            return id;
        }
        let root_id = format!("{}-root", id);
        if modules.contains_key(&root_id) {
            return root_id;
        }
    }

    dirs[0].clone()
}

/// Import string → files importing it, over every loaded shard
pub fn reverse_import_graph(shards: &BTreeMap<String, DetailShard>) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for shard in shards.values() {
        for (path, detail) in &shard.files {
            for import in &detail.signatures.imports {
                graph.entry(import.clone()).or_default().insert(path.clone());
            }
        }
    }
    graph
}

/// Files importing any of `changed` (one hop, excluding the changed files)
pub fn expand_importers(
    graph: &BTreeMap<String, BTreeSet<String>>,
    changed: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut importers = BTreeSet::new();
    for (import, files) in graph {
        if changed.iter().any(|path| import_matches_path(import, path)) {
            importers.extend(files.iter().filter(|f| !changed.contains(*f)).cloned());
        }
    }
    importers
}

/// Segment-suffix match of a raw import string against a file path
///
/// The file's last path segment (its directory for `mod`/`index`/`__init__`
/// files) must appear in the import, and the import segments before it must
/// agree with the directories before it as far as both go.
pub fn import_matches_path(import: &str, path: &str) -> bool {
    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    let mut path_segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    path_segments.push(stem);
    if path_segments.len() > 1
        && matches!(path_segments.last(), Some(&("mod" | "index" | "__init__" | "lib")))
    {
        path_segments.pop();
    }

    let import_segments: Vec<&str> = import
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|s| !s.is_empty() && !matches!(*s, "crate" | "self" | "super"))
        .collect();

    let Some((last, parents)) = path_segments.split_last() else {
        return false;
    };

    import_segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| *seg == last)
        .any(|(idx, _)| {
            import_segments[..idx]
                .iter()
                .rev()
                .zip(parents.iter().rev())
                .all(|(a, b)| a == b)
        })
}

fn load_all_shards(store: &IndexStore, core: &CoreIndex) -> Result<BTreeMap<String, DetailShard>> {
    let mut shards = BTreeMap::new();
    for id in core.modules.keys() {
        let shard = store
            .read_shard(id)
            .with_context(|| format!("Failed to load shard '{}'", id))?;
        shards.insert(id.clone(), shard);
    }
    Ok(shards)
}

/// Rebuild the analysis a previous build produced from its artifacts
fn analysis_from_index(core: &CoreIndex, shards: &BTreeMap<String, DetailShard>) -> Analysis {
    let mut analysis = Analysis::default();
    for shard in shards.values() {
        analysis
            .details
            .extend(shard.files.iter().map(|(p, d)| (p.clone(), d.clone())));
        for (path, summary) in &shard.doc_standard {
            analysis.docs.insert(path.clone(), (DocTier::Standard, summary.clone()));
        }
        for (path, summary) in &shard.doc_archive {
            analysis.docs.insert(path.clone(), (DocTier::Archive, summary.clone()));
        }
    }
    for (path, summary) in &core.d_critical {
        analysis.docs.insert(path.clone(), (DocTier::Critical, summary.clone()));
    }
    analysis
}

/// Write or remove the shards of affected modules, recording backups first
fn regenerate(
    store: &IndexStore,
    affected: &BTreeSet<String>,
    modules: &ModuleMap,
    analysis: &Analysis,
    module_hashes: &mut BTreeMap<String, String>,
    backups: &mut ShardBackups,
) -> Result<()> {
    for id in affected {
        backups.insert(id.clone(), store.read_shard_bytes(id)?);

        match modules.get(id) {
            Some(files) => {
                let shard = build_shard(id, files, analysis);
                let hash = store
                    .write_shard(&shard)
                    .with_context(|| format!("Failed to write shard '{}'", id))?;
                module_hashes.insert(id.clone(), hash);
            }
            None => {
                log::info!("Module '{}' is empty, removing it", id);
                store.remove_shard(id)?;
                module_hashes.remove(id);
            }
        }
    }
    Ok(())
}

/// Validate the new index against the shards on disk and write it
///
/// On any problem the touched shards are restored from `backups`, the Core
/// Index is left as it was, and an `IntegrityViolation` is returned.
pub fn commit_or_rollback(store: &IndexStore, new_core: &CoreIndex, backups: &ShardBackups) -> Result<()> {
    let problems = store.integrity_problems(new_core);
    if !problems.is_empty() {
        for problem in &problems {
            log::warn!("Integrity: {}", problem);
        }
        rollback(store, backups);
        return Err(IndexError::IntegrityViolation { problems }.into());
    }

    if let Err(e) = store.write_core(new_core) {
        rollback(store, backups);
        return Err(e.into());
    }

    log::info!("Committed update of {} modules", backups.len());
    Ok(())
}

fn rollback(store: &IndexStore, backups: &ShardBackups) {
    for (id, previous) in backups {
        if let Err(e) = store.restore_shard(id, previous.as_deref()) {
            log::error!("Failed to restore shard '{}': {}", id, e);
        }
    }
    if !backups.is_empty() {
        log::warn!("Rolled back {} shards", backups.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDetail, Language, SHARD_VERSION};
    use tempfile::TempDir;

    fn modules(ids: &[&str]) -> ModuleMap {
        ids.iter().map(|id| (id.to_string(), vec![format!("{}/x", id)])).collect()
    }

    #[test]
    fn test_assign_module_prefers_deepest() {
        let map = modules(&["src-components", "src-root", "docs"]);
        assert_eq!(assign_module("src/components/forms/Input.tsx", &map), "src-components");
        assert_eq!(assign_module("src/newdir/a.ts", &map), "src-root");
        assert_eq!(assign_module("src/b.ts", &map), "src-root");
        assert_eq!(assign_module("docs/guide.md", &map), "docs");
        assert_eq!(assign_module("tools/gen.py", &map), "tools");
        assert_eq!(assign_module("setup.py", &map), ROOT_MODULE);
    }

    #[test]
    fn test_import_matching() {
        assert!(import_matches_path("crate::store::IndexStore", "src/store.rs"));
        assert!(import_matches_path("./components/Button", "src/components/Button.tsx"));
        assert!(import_matches_path(".utils", "pkg/utils.py"));
        assert!(import_matches_path("app.models", "app/models/__init__.py"));
        assert!(!import_matches_path("os.path", "lib/path.py"));
        assert!(!import_matches_path("react", "src/components/Button.tsx"));
    }

    #[test]
    fn test_expand_importers_is_one_hop() {
        let mut detail_a = FileDetail::listed_only(Language::Python);
        detail_a.signatures.imports = vec!["pkg.b".into()];
        let mut detail_b = FileDetail::listed_only(Language::Python);
        detail_b.signatures.imports = vec!["pkg.c".into()];

        let shard = DetailShard {
            module_id: "pkg".into(),
            version: SHARD_VERSION.into(),
            files: [("pkg/a.py".to_string(), detail_a), ("pkg/b.py".to_string(), detail_b)]
                .into_iter()
                .collect(),
            call_graph_local: vec![],
            call_graph_external: vec![],
            doc_standard: BTreeMap::new(),
            doc_archive: BTreeMap::new(),
        };
        let shards: BTreeMap<String, DetailShard> = [("pkg".to_string(), shard)].into_iter().collect();
        let graph = reverse_import_graph(&shards);

        let changed: BTreeSet<String> = ["pkg/c.py".to_string()].into_iter().collect();
        let importers = expand_importers(&graph, &changed);
        assert_eq!(importers.into_iter().collect::<Vec<_>>(), vec!["pkg/b.py"]);
    }

    #[test]
    fn test_commit_rejects_corrupt_shard_and_restores() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.py"), "def a():\n    pass\n").unwrap();

        let (core, _) = crate::indexer::build(root, &Default::default()).unwrap();
        let store = IndexStore::new(root);
        let core_before = std::fs::read(store.core_path()).unwrap();
        let shard_before = store.read_shard_bytes("src").unwrap();

        // Simulate a regenerated shard whose bytes drift from the recorded hash
        let mut backups = ShardBackups::new();
        backups.insert("src".to_string(), shard_before.clone());
        std::fs::write(store.shard_path("src"), b"{\"module_id\":\"src\"}").unwrap();

        let err = commit_or_rollback(&store, &core, &backups).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::IntegrityViolation { .. })
        ));
        assert_eq!(std::fs::read(store.core_path()).unwrap(), core_before);
        assert_eq!(store.read_shard_bytes("src").unwrap(), shard_before);
        assert!(store.validate_index_integrity());
    }

    #[test]
    fn test_update_without_git_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("main.py"), "def main():\n    pass\n").unwrap();

        let indexer = Indexer::new(Default::default());
        indexer.build(root).unwrap();

        let err = update(&indexer, root).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::VersionControlUnavailable(_))
        ));
    }
}

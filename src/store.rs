//! On-disk layout of the index
//!
//! The store owns every path under the project root that the index writes:
//! - `PROJECT_INDEX.json`: the Core Index (or a legacy single-file index)
//! - `PROJECT_INDEX.d/<module_id>.json`: one Detail Shard per module
//! - `PROJECT_INDEX.json.backup`: legacy index saved by `--migrate`
//!
//! All writes go through `atomic_write` (temp file + rename) so a crash
//! never leaves a half-written document behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::models::{CoreIndex, DetailShard, LegacyIndex, SPLIT_VERSION};

pub const CORE_FILE: &str = "PROJECT_INDEX.json";
pub const DETAIL_DIR: &str = "PROJECT_INDEX.d";
pub const BACKUP_FILE: &str = "PROJECT_INDEX.json.backup";

/// Write bytes to `path` via a sibling temp file and a rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, bytes).map_err(|e| IndexError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        IndexError::io(path, e)
    })
}

/// blake3 hex digest of a document's bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Compact serialization used for every index document
pub fn to_bytes<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| IndexError::Malformed {
        what: what.to_string(),
        source,
    })
}

/// Index paths rooted at one project directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn core_path(&self) -> PathBuf {
        self.root.join(CORE_FILE)
    }

    pub fn detail_dir(&self) -> PathBuf {
        self.root.join(DETAIL_DIR)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.root.join(BACKUP_FILE)
    }

    pub fn shard_path(&self, module_id: &str) -> PathBuf {
        self.detail_dir().join(format!("{}.json", module_id))
    }

    /// `detail_path` as recorded in the Core Index
    pub fn detail_rel_path(module_id: &str) -> String {
        format!("{}/{}.json", DETAIL_DIR, module_id)
    }

    /// Check if an index document exists at the root
    pub fn exists(&self) -> bool {
        self.core_path().exists()
    }

    /// `version` field of the existing index document, if any
    pub fn index_version(&self) -> Option<String> {
        let bytes = std::fs::read(self.core_path()).ok()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        value.get("version")?.as_str().map(str::to_string)
    }

    /// Existing index is in the split layout
    pub fn is_split(&self) -> bool {
        self.index_version().as_deref() == Some(SPLIT_VERSION)
    }

    pub fn read_core(&self) -> Result<CoreIndex> {
        let path = self.core_path();
        if !path.exists() {
            return Err(IndexError::NoIndex(path));
        }
        let core: CoreIndex = read_json(&path, CORE_FILE)?;
        if core.version != SPLIT_VERSION {
            return Err(IndexError::NoIndex(path));
        }
        Ok(core)
    }

    pub fn read_legacy(&self) -> Result<LegacyIndex> {
        read_json(&self.core_path(), CORE_FILE)
    }

    pub fn write_core(&self, core: &CoreIndex) -> Result<()> {
        atomic_write(&self.core_path(), &to_bytes(core, CORE_FILE)?)
    }

    pub fn write_legacy(&self, legacy: &LegacyIndex) -> Result<()> {
        atomic_write(&self.core_path(), &to_bytes(legacy, CORE_FILE)?)
    }

    /// Serialized form of a shard; identical input gives identical bytes
    pub fn shard_bytes(shard: &DetailShard) -> Result<Vec<u8>> {
        to_bytes(shard, &format!("shard '{}'", shard.module_id))
    }

    /// Write one shard and return the hash of its on-disk bytes
    pub fn write_shard(&self, shard: &DetailShard) -> Result<String> {
        let dir = self.detail_dir();
        std::fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;

        let bytes = Self::shard_bytes(shard)?;
        atomic_write(&self.shard_path(&shard.module_id), &bytes)?;
        Ok(hash_bytes(&bytes))
    }

    pub fn read_shard(&self, module_id: &str) -> Result<DetailShard> {
        let path = self.shard_path(module_id);
        if !path.exists() {
            return Err(IndexError::NotFound {
                kind: "module",
                name: module_id.to_string(),
            });
        }
        read_json(&path, &format!("shard '{}'", module_id))
    }

    /// Raw bytes of a shard, `None` if it does not exist
    pub fn read_shard_bytes(&self, module_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.shard_path(module_id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexError::io(path, e)),
        }
    }

    /// Put a shard back to a previous state (`None` = it did not exist)
    pub fn restore_shard(&self, module_id: &str, previous: Option<&[u8]>) -> Result<()> {
        match previous {
            Some(bytes) => atomic_write(&self.shard_path(module_id), bytes),
            None => self.remove_shard(module_id),
        }
    }

    pub fn remove_shard(&self, module_id: &str) -> Result<()> {
        let path = self.shard_path(module_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::io(path, e)),
        }
    }

    /// Delete shard files whose module is not in `keep`
    pub fn clear_stale_shards(&self, keep: &BTreeSet<String>) -> Result<usize> {
        let dir = self.detail_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(IndexError::io(dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| IndexError::io(&dir, e))?.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_json && !keep.contains(stem) {
                std::fs::remove_file(&path).map_err(|e| IndexError::io(&path, e))?;
                log::debug!("Removed stale shard {}", path.display());
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Every integrity problem of a Core Index against the shards on disk
    ///
    /// Checks the partition invariant and that each hashed shard exists and
    /// hashes to its recorded value. Unless the index was built without
    /// shards (no hashes at all), every module must carry a hash.
    pub fn integrity_problems(&self, core: &CoreIndex) -> Vec<String> {
        let mut problems = core.partition_problems();

        if !core.module_hashes.is_empty() {
            for module_id in core.modules.keys() {
                if !core.module_hashes.contains_key(module_id) {
                    problems.push(format!("module '{}' has no recorded hash", module_id));
                }
            }
        }

        for (module_id, expected) in &core.module_hashes {
            if !core.modules.contains_key(module_id) {
                problems.push(format!("hash recorded for unknown module '{}'", module_id));
                continue;
            }
            match self.read_shard_bytes(module_id) {
                Ok(Some(bytes)) => {
                    let actual = hash_bytes(&bytes);
                    if &actual != expected {
                        problems.push(format!(
                            "shard '{}' hash mismatch (expected {}, found {})",
                            module_id, expected, actual
                        ));
                    }
                }
                Ok(None) => problems.push(format!("shard '{}' is missing", module_id)),
                Err(e) => problems.push(format!("shard '{}' unreadable: {}", module_id, e)),
            }
        }

        problems
    }

    /// `true` when the on-disk split index is internally consistent
    pub fn validate_index_integrity(&self) -> bool {
        match self.read_core() {
            Ok(core) => {
                let problems = self.integrity_problems(&core);
                for problem in &problems {
                    log::warn!("Integrity: {}", problem);
                }
                problems.is_empty()
            }
            Err(e) => {
                log::warn!("Integrity: {}", e);
                false
            }
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| IndexError::Malformed {
        what: what.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDetail, IndexStats, Language, ModuleEntry, SHARD_VERSION};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn shard(id: &str, files: &[&str]) -> DetailShard {
        DetailShard {
            module_id: id.to_string(),
            version: SHARD_VERSION.to_string(),
            files: files
                .iter()
                .map(|f| (f.to_string(), FileDetail::listed_only(Language::Rust)))
                .collect(),
            call_graph_local: vec![],
            call_graph_external: vec![],
            doc_standard: BTreeMap::new(),
            doc_archive: BTreeMap::new(),
        }
    }

    fn core_for(store: &IndexStore, shards: &[DetailShard]) -> CoreIndex {
        let mut core = CoreIndex {
            version: SPLIT_VERSION.to_string(),
            at: "2026-01-01T00:00:00Z".to_string(),
            root: "demo".to_string(),
            tree: vec![],
            stats: IndexStats::default(),
            modules: BTreeMap::new(),
            file_to_module_map: BTreeMap::new(),
            module_hashes: BTreeMap::new(),
            d_critical: BTreeMap::new(),
            d_standard: None,
            d_archive: None,
            priority_modules: vec![],
        };
        for s in shards {
            let hash = store.write_shard(s).unwrap();
            let files: Vec<String> = s.files.keys().cloned().collect();
            for f in &files {
                core.file_to_module_map.insert(f.clone(), s.module_id.clone());
            }
            core.modules.insert(
                s.module_id.clone(),
                ModuleEntry {
                    file_count: files.len(),
                    function_count: 0,
                    detail_path: IndexStore::detail_rel_path(&s.module_id),
                    files,
                },
            );
            core.module_hashes.insert(s.module_id.clone(), hash);
        }
        core
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        atomic_write(&path, b"{}").unwrap();
        atomic_write(&path, b"[]").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
        assert!(!temp.path().join("doc.json.tmp").exists());
    }

    #[test]
    fn test_shard_bytes_deterministic() {
        let a = IndexStore::shard_bytes(&shard("src", &["src/b.rs", "src/a.rs"])).unwrap();
        let b = IndexStore::shard_bytes(&shard("src", &["src/a.rs", "src/b.rs"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_valid_index() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        let core = core_for(&store, &[shard("src", &["src/a.rs"]), shard("root", &["main.rs"])]);
        store.write_core(&core).unwrap();

        assert!(store.is_split());
        assert!(store.validate_index_integrity());
        assert_eq!(store.read_core().unwrap(), core);
    }

    #[test]
    fn test_tampered_shard_detected() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        let core = core_for(&store, &[shard("src", &["src/a.rs"])]);
        store.write_core(&core).unwrap();

        std::fs::write(store.shard_path("src"), b"{\"module_id\":\"src\"}").unwrap();

        let problems = store.integrity_problems(&core);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("hash mismatch"));
        assert!(!store.validate_index_integrity());
    }

    #[test]
    fn test_missing_shard_detected() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        let core = core_for(&store, &[shard("lib", &["lib/x.py"])]);
        store.remove_shard("lib").unwrap();

        let problems = store.integrity_problems(&core);
        assert!(problems[0].contains("missing"));
    }

    #[test]
    fn test_unhashed_module_detected() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        let mut core = core_for(&store, &[shard("src", &["src/a.rs"]), shard("lib", &["lib/x.py"])]);
        core.module_hashes.remove("lib");

        let problems = store.integrity_problems(&core);
        assert_eq!(problems, vec!["module 'lib' has no recorded hash".to_string()]);

        // An index built without shards carries no hashes at all
        core.module_hashes.clear();
        assert!(store.integrity_problems(&core).is_empty());
    }

    #[test]
    fn test_clear_stale_shards() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        store.write_shard(&shard("keep", &["keep/a.rs"])).unwrap();
        store.write_shard(&shard("old", &["old/a.rs"])).unwrap();

        let keep: BTreeSet<String> = ["keep".to_string()].into_iter().collect();
        assert_eq!(store.clear_stale_shards(&keep).unwrap(), 1);
        assert!(store.shard_path("keep").exists());
        assert!(!store.shard_path("old").exists());
    }

    #[test]
    fn test_restore_shard() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        store.write_shard(&shard("src", &["src/a.rs"])).unwrap();
        let before = store.read_shard_bytes("src").unwrap();

        store.write_shard(&shard("src", &["src/a.rs", "src/b.rs"])).unwrap();
        store.restore_shard("src", before.as_deref()).unwrap();
        assert_eq!(store.read_shard_bytes("src").unwrap(), before);

        store.restore_shard("src", None).unwrap();
        assert!(store.read_shard_bytes("src").unwrap().is_none());
    }

    #[test]
    fn test_read_core_without_index() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path());
        assert!(matches!(store.read_core(), Err(IndexError::NoIndex(_))));
        assert!(!store.validate_index_integrity());
    }
}

//! On-demand shard loading

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::models::{CoreIndex, DetailShard};
use crate::organizer::is_valid_module_id;
use crate::store::{hash_bytes, IndexStore};

/// Top-level fields a shard must carry
const REQUIRED_SHARD_FIELDS: &[&str] = &["module_id", "version", "files"];

/// Load the Core Index of a project
pub fn load_core(root: &Path) -> Result<CoreIndex> {
    IndexStore::new(root).read_core()
}

/// Loads the Core Index once and Detail Shards as they are requested
///
/// Shards are verified against `module_hashes` before they are handed out,
/// so a shard modified after the index was written is refused.
pub struct LazyLoader {
    store: IndexStore,
    core: Option<Arc<CoreIndex>>,
    shards: HashMap<String, Arc<DetailShard>>,
}

impl LazyLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            store: IndexStore::new(root),
            core: None,
            shards: HashMap::new(),
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// The Core Index, read on first use
    pub fn load_core(&mut self) -> Result<Arc<CoreIndex>> {
        if let Some(core) = &self.core {
            return Ok(Arc::clone(core));
        }
        let core = Arc::new(self.store.read_core()?);
        self.core = Some(Arc::clone(&core));
        Ok(core)
    }

    /// Load one shard by module id
    pub fn load_module(&mut self, module_id: &str) -> Result<Arc<DetailShard>> {
        if !is_valid_module_id(module_id) {
            return Err(IndexError::InvalidName(module_id.to_string()));
        }
        if let Some(shard) = self.shards.get(module_id) {
            return Ok(Arc::clone(shard));
        }

        let what = format!("shard '{}'", module_id);
        let bytes = self
            .store
            .read_shard_bytes(module_id)?
            .ok_or_else(|| IndexError::NotFound {
                kind: "module",
                name: module_id.to_string(),
            })?;

        let value: Value = serde_json::from_slice(&bytes).map_err(|source| IndexError::Malformed {
            what: what.clone(),
            source,
        })?;
        let missing: Vec<String> = REQUIRED_SHARD_FIELDS
            .iter()
            .filter(|field| value.get(**field).is_none())
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IndexError::MissingFields { what, fields: missing });
        }

        self.verify_hash(module_id, &bytes)?;

        let shard: DetailShard =
            serde_json::from_value(value).map_err(|source| IndexError::Malformed { what, source })?;
        let shard = Arc::new(shard);
        self.shards.insert(module_id.to_string(), Arc::clone(&shard));
        Ok(shard)
    }

    /// Load several shards; failures are logged and skipped
    pub fn load_many<S: AsRef<str>>(&mut self, module_ids: &[S]) -> BTreeMap<String, Arc<DetailShard>> {
        let mut loaded = BTreeMap::new();
        for id in module_ids {
            let id = id.as_ref();
            match self.load_module(id) {
                Ok(shard) => {
                    loaded.insert(id.to_string(), shard);
                }
                Err(e) => log::warn!("Skipping module '{}': {}", id, e),
            }
        }
        loaded
    }

    /// Every shard listed in the Core Index
    pub fn load_all(&mut self) -> Result<BTreeMap<String, Arc<DetailShard>>> {
        let core = self.load_core()?;
        let ids: Vec<&String> = core.modules.keys().collect();
        Ok(self.load_many(&ids))
    }

    fn verify_hash(&mut self, module_id: &str, bytes: &[u8]) -> Result<()> {
        let core = match self.load_core() {
            Ok(core) => core,
            // Shards without a split Core Index have nothing to verify against
            Err(IndexError::NoIndex(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        match core.module_hashes.get(module_id) {
            Some(expected) => {
                let actual = hash_bytes(bytes);
                if &actual != expected {
                    return Err(IndexError::IntegrityViolation {
                        problems: vec![format!(
                            "shard '{}' hash mismatch (expected {}, found {})",
                            module_id, expected, actual
                        )],
                    });
                }
                Ok(())
            }
            // Built without shard hashes; nothing to verify against
            None if core.modules.contains_key(module_id) && core.module_hashes.is_empty() => Ok(()),
            None if core.modules.contains_key(module_id) => Err(IndexError::IntegrityViolation {
                problems: vec![format!("module '{}' has no recorded hash", module_id)],
            }),
            None => Err(IndexError::NotFound {
                kind: "module",
                name: module_id.to_string(),
            }),
        }
    }
}

//! Signature cache for storing extractor output
//!
//! Re-running an extractor on an unchanged file is wasted work. Entries are
//! keyed by blake3(absolute path, mtime, size), so any change to a file
//! produces a new key and the old entry is simply orphaned; nothing is ever
//! evicted in place.
//!
//! The cache lives in `.project-index/signature_cache.json` and is
//! disposable: a version or extractor-schema mismatch, or a file that does
//! not parse, discards the whole cache and starts empty.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;

use crate::models::Signatures;
use crate::store::atomic_write;

/// Directory holding disposable index state
pub const CACHE_DIR: &str = ".project-index";
pub const CACHE_FILE: &str = "signature_cache.json";

/// Layout version of the cache file
const CACHE_VERSION: u32 = 1;

/// Hash of the extractor sources this binary was built from (see build.rs)
const EXTRACTOR_SCHEMA: &str = env!("EXTRACTOR_SCHEMA_HASH");

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    schema: String,
    entries: BTreeMap<String, Signatures>,
}

/// Cache counters, reported after a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Memo of extractor output, passed explicitly through the build
pub struct SignatureCache {
    /// `None` for a cache that is never persisted
    path: Option<PathBuf>,
    entries: BTreeMap<String, Signatures>,
    dirty: bool,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SignatureCache {
    /// A cache that lives only for this process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            dirty: false,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Load the cache for a project root, starting empty on any problem
    pub fn load(root: &Path) -> Self {
        let path = root.join(CACHE_DIR).join(CACHE_FILE);
        let mut cache = Self::in_memory();

        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                Ok(file) if file.version == CACHE_VERSION && file.schema == EXTRACTOR_SCHEMA => {
                    log::debug!("Loaded signature cache with {} entries", file.entries.len());
                    cache.entries = file.entries;
                }
                Ok(file) => {
                    log::debug!(
                        "Discarding signature cache (version {} schema {}, expected {} {})",
                        file.version,
                        file.schema,
                        CACHE_VERSION,
                        EXTRACTOR_SCHEMA
                    );
                }
                Err(e) => log::debug!("Discarding corrupt signature cache: {}", e),
            },
            Err(_) => log::debug!("No signature cache at {}", path.display()),
        }

        cache.path = Some(path);
        cache
    }

    /// Cache key of a file, or `None` if it cannot be stat'ed
    pub fn cache_key(path: &Path) -> Option<String> {
        let absolute = std::fs::canonicalize(path).ok()?;
        let metadata = std::fs::metadata(&absolute).ok()?;
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut hasher = blake3::Hasher::new();
        hasher.update(absolute.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(mtime_ns.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(metadata.len().to_string().as_bytes());
        Some(hasher.finalize().to_hex().to_string())
    }

    /// Cached signatures under `key`
    ///
    /// Callers compute the key with [`Self::cache_key`] before reading the
    /// file, and store the extraction result under that same key.
    pub fn get(&self, key: &str) -> Option<Signatures> {
        let hit = self.entries.get(key).cloned();
        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Record extractor output for the file state `key` was computed from
    pub fn put(&mut self, key: String, signatures: Signatures) {
        self.entries.insert(key, signatures);
        self.dirty = true;
    }

    /// Persist if anything changed since load
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let bytes = serde_json::to_vec(&serde_json::json!({
            "version": CACHE_VERSION,
            "schema": EXTRACTOR_SCHEMA,
            "entries": &self.entries,
        }))
        .context("Failed to serialize signature cache")?;

        atomic_write(path, &bytes)?;
        self.dirty = false;

        log::debug!("Saved signature cache ({} entries)", self.entries.len());
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

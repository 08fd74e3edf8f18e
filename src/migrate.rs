//! Legacy single-file index → split layout
//!
//! The legacy document is copied to `PROJECT_INDEX.json.backup` before
//! anything is written. Shards are then built from the legacy data (no
//! re-extraction), the new Core Index is validated against them and written.
//! Any failure puts the original document back byte-for-byte and removes the
//! shards written so far.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::IndexError;
use crate::framework;
use crate::indexer::{assemble_core, build_shard, resolve_root, Analysis, Indexer};
use crate::models::{CoreIndex, FileDetail, Language, LegacyIndex, LEGACY_VERSION};
use crate::store::{atomic_write, IndexStore, CORE_FILE};

#[derive(Debug, Clone, PartialEq)]
pub enum MigrateOutcome {
    /// The index already uses the split layout
    AlreadySplit,
    Migrated { core: CoreIndex },
}

/// Convert the legacy index at `root` into a split index
pub fn migrate(indexer: &Indexer, root: &Path) -> Result<MigrateOutcome> {
    let root = resolve_root(root)?;
    let store = IndexStore::new(&root);

    let original = match std::fs::read(store.core_path()) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::NoIndex(store.core_path()).into());
        }
        Err(e) => return Err(IndexError::io(store.core_path(), e).into()),
    };

    if store.is_split() {
        log::info!("Index is already in the split layout");
        return Ok(MigrateOutcome::AlreadySplit);
    }

    let legacy: LegacyIndex = serde_json::from_slice(&original).map_err(|source| IndexError::Malformed {
        what: CORE_FILE.to_string(),
        source,
    })?;
    if legacy.version != LEGACY_VERSION {
        log::warn!(
            "Unexpected legacy index version '{}', migrating anyway",
            legacy.version
        );
    }

    atomic_write(&store.backup_path(), &original).context("Failed to write migration backup")?;
    log::info!("Backed up legacy index to {}", store.backup_path().display());

    let detail_dir_existed = store.detail_dir().exists();
    let mut written: BTreeSet<String> = BTreeSet::new();

    match convert(indexer, &root, &store, legacy, &mut written) {
        Ok(core) => {
            log::info!("Migrated {} files into {} modules", core.stats.total_files, core.modules.len());
            Ok(MigrateOutcome::Migrated { core })
        }
        Err(e) => {
            log::error!("Migration failed, restoring the legacy index: {:#}", e);
            restore(&store, &original, &written, detail_dir_existed);
            Err(e)
        }
    }
}

fn convert(
    indexer: &Indexer,
    root: &Path,
    store: &IndexStore,
    legacy: LegacyIndex,
    written: &mut BTreeSet<String>,
) -> Result<CoreIndex> {
    let mut analysis = Analysis {
        details: legacy.files,
        ..Analysis::default()
    };
    for (tier, docs) in legacy.docs {
        for (path, summary) in docs {
            analysis
                .details
                .entry(path.clone())
                .or_insert_with(|| FileDetail {
                    listed_only: false,
                    ..FileDetail::listed_only(Language::Markdown)
                });
            analysis.docs.insert(path, (tier, summary));
        }
    }

    let files = analysis.files();
    let detection = framework::detect(&files);
    let modules = indexer.organizer(detection.as_ref()).build_module_set(&files);

    let mut module_hashes = BTreeMap::new();
    for (id, module_files) in &modules {
        let shard = build_shard(id, module_files, &analysis);
        let hash = store
            .write_shard(&shard)
            .with_context(|| format!("Failed to write shard '{}'", id))?;
        written.insert(id.clone());
        module_hashes.insert(id.clone(), hash);
    }

    let mut core = assemble_core(
        root,
        &modules,
        &analysis,
        module_hashes,
        legacy.stats.file_source,
        detection.as_ref(),
        indexer.config(),
    );
    // Keep the legacy anchor so the next incremental run sees later changes
    core.at = legacy.at;

    let problems = store.integrity_problems(&core);
    if !problems.is_empty() {
        return Err(IndexError::IntegrityViolation { problems }.into());
    }

    store.write_core(&core).context("Failed to write core index")?;
    if !store.validate_index_integrity() {
        return Err(IndexError::IntegrityViolation {
            problems: vec!["written index failed validation".to_string()],
        }
        .into());
    }

    Ok(core)
}

fn restore(store: &IndexStore, original: &[u8], written: &BTreeSet<String>, detail_dir_existed: bool) {
    if let Err(e) = atomic_write(&store.core_path(), original) {
        log::error!(
            "Failed to restore {}: {} (backup kept at {})",
            CORE_FILE,
            e,
            store.backup_path().display()
        );
    }

    for id in written {
        if let Err(e) = store.remove_shard(id) {
            log::warn!("Failed to remove shard '{}': {}", id, e);
        }
    }
    if !detail_dir_existed {
        let _ = std::fs::remove_dir_all(store.detail_dir());
    }
}

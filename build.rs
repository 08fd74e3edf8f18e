//! Build-time schema hash for signature cache invalidation
//!
//! The signature cache stores extractor output keyed by file identity. When
//! an extractor or the signature data model changes, previously cached
//! entries no longer describe what a fresh extraction would produce. This
//! script hashes the extraction-critical sources into EXTRACTOR_SCHEMA_HASH;
//! a cache written under a different hash is discarded on load.
//!
//! ## Extraction-critical files:
//! - src/models.rs: Signatures, FunctionSig, ClassSig
//! - src/signature_cache.rs: cache file layout
//! - src/extractors/*.rs: extraction heuristics per language

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Sources whose changes invalidate cached signatures
const SCHEMA_CRITICAL_FILES: &[&str] = &[
    "src/models.rs",
    "src/signature_cache.rs",
    "src/extractors/mod.rs",
    "src/extractors/rust.rs",
    "src/extractors/python.rs",
    "src/extractors/javascript.rs",
    "src/extractors/shell.rs",
];

fn main() {
    let schema_hash = compute_schema_hash();

    println!("cargo:rustc-env=EXTRACTOR_SCHEMA_HASH={}", schema_hash);

    for file in SCHEMA_CRITICAL_FILES {
        println!("cargo:rerun-if-changed={}", file);
    }
}

/// Deterministic hash over path and content of every critical file
fn compute_schema_hash() -> String {
    let mut hasher = blake3::Hasher::new();

    let files: BTreeSet<&str> = SCHEMA_CRITICAL_FILES.iter().copied().collect();

    for file_path in &files {
        let path = Path::new(file_path);

        if !path.exists() {
            panic!("Schema-critical file not found: {}", file_path);
        }

        let content = fs::read(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", file_path, e));

        hasher.update(file_path.as_bytes());
        hasher.update(&content);
    }

    // 64 bits is plenty to tell schema generations apart
    hasher.finalize().as_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

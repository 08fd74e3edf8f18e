//! Index builder
//!
//! A full build scans the project, extracts signatures (through the
//! signature cache, in parallel), classifies documentation, organizes files
//! into modules, writes one Detail Shard per module and finally the Core
//! Index. The pieces are public so the incremental engine can regenerate a
//! subset of modules with exactly the same logic.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::IndexConfig;
use crate::docs::{summarize, DocClassifier};
use crate::extractors::ExtractorRegistry;
use crate::framework::{self, Detection};
use crate::git::Git;
use crate::models::{
    CallEdge, CoreIndex, DetailShard, DocSummary, DocTier, FileDetail, FileSource, GitInfo,
    IndexStats, Language, LegacyIndex, ModuleEntry, Signatures, LEGACY_VERSION, SHARD_VERSION,
    SPLIT_VERSION,
};
use crate::organizer::{build_file_to_module_map, ModuleMap, Organizer};
use crate::signature_cache::{SignatureCache, CACHE_DIR};
use crate::store::{IndexStore, BACKUP_FILE, CORE_FILE, DETAIL_DIR};
use crate::tree;

/// Directories never indexed
pub const EXCLUDED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    ".git",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".venv",
    "venv",
    ".next",
    ".nuxt",
    "coverage",
    CACHE_DIR,
    DETAIL_DIR,
];

/// Per-file analysis of some set of files
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Every analyzed file, code and docs alike
    pub details: BTreeMap<String, FileDetail>,
    /// Documentation files with their tier and summary
    pub docs: BTreeMap<String, (DocTier, DocSummary)>,
    /// Files downgraded to listed-only because extraction failed
    pub skipped: usize,
}

impl Analysis {
    /// Overlay another analysis, dropping the given files first
    pub fn merge(&mut self, other: Analysis, removed: &BTreeSet<String>) {
        for path in removed {
            self.details.remove(path);
            self.docs.remove(path);
        }
        for path in other.details.keys() {
            self.docs.remove(path);
        }
        self.details.extend(other.details);
        self.docs.extend(other.docs);
        self.skipped += other.skipped;
    }

    pub fn files(&self) -> Vec<String> {
        self.details.keys().cloned().collect()
    }
}

/// What happened to one file in the parallel phase
enum FileOutcome {
    Doc(DocTier, DocSummary),
    Cached(Signatures),
    /// Fresh signatures with the cache key taken before the file was read
    Extracted(Option<String>, Signatures),
    /// No extractor for the language
    Unsupported,
    Failed(String),
}

/// Build an index with default collaborators
pub fn build(root: &Path, config: &IndexConfig) -> Result<(CoreIndex, usize)> {
    Indexer::new(config.clone()).build(root)
}

/// Runs full builds and provides the building blocks for incremental ones
pub struct Indexer {
    config: IndexConfig,
    registry: ExtractorRegistry,
    show_progress: bool,
}

impl Indexer {
    /// Create a new indexer with the built-in extractors
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            registry: ExtractorRegistry::with_defaults(),
            show_progress: false,
        }
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Full split build: shards first, Core Index last
    pub fn build(&self, root: &Path) -> Result<(CoreIndex, usize)> {
        let start = Instant::now();
        let root = resolve_root(root)?;
        log::info!("Indexing directory: {:?}", root);

        let (files, file_source) = self.discover_files(&root)?;
        log::info!("Discovered {} files to index ({:?})", files.len(), file_source);

        let mut cache = SignatureCache::load(&root);
        let git_info = self.git_metadata(&root, file_source);
        let classifier = self.doc_classifier();
        let analysis = self.analyze(&root, &files, &mut cache, &git_info, &classifier)?;

        let detection = framework::detect(&files);
        let modules = self.organizer(detection.as_ref()).build_module_set(&files);
        log::info!("Organized {} files into {} modules", files.len(), modules.len());

        let store = IndexStore::new(&root);
        let mut module_hashes = BTreeMap::new();
        if self.config.skip_details {
            store
                .clear_stale_shards(&BTreeSet::new())
                .context("Failed to remove old detail shards")?;
        } else {
            for (module_id, module_files) in &modules {
                let shard = build_shard(module_id, module_files, &analysis);
                let hash = store
                    .write_shard(&shard)
                    .with_context(|| format!("Failed to write shard '{}'", module_id))?;
                module_hashes.insert(module_id.clone(), hash);
            }
            let keep: BTreeSet<String> = modules.keys().cloned().collect();
            let removed = store.clear_stale_shards(&keep).context("Failed to remove stale shards")?;
            if removed > 0 {
                log::info!("Removed {} stale shards", removed);
            }
        }

        let core = assemble_core(
            &root,
            &modules,
            &analysis,
            module_hashes,
            file_source,
            detection.as_ref(),
            &self.config,
        );
        store.write_core(&core).context("Failed to write core index")?;

        save_cache(&mut cache);
        log::info!(
            "Indexing complete: {} files, {} modules, {} skipped in {:.2?}",
            core.stats.total_files,
            core.modules.len(),
            analysis.skipped,
            start.elapsed()
        );

        Ok((core, analysis.skipped))
    }

    /// Full build emitted as one legacy single-file document
    pub fn build_legacy(&self, root: &Path) -> Result<(LegacyIndex, usize)> {
        let root = resolve_root(root)?;
        log::info!("Indexing directory (single file): {:?}", root);

        let (files, file_source) = self.discover_files(&root)?;
        let mut cache = SignatureCache::load(&root);
        let git_info = self.git_metadata(&root, file_source);
        let classifier = self.doc_classifier();
        let analysis = self.analyze(&root, &files, &mut cache, &git_info, &classifier)?;
        let detection = framework::detect(&files);

        let mut call_graph: Vec<CallEdge> = analysis
            .details
            .values()
            .flat_map(|detail| call_edges(&detail.signatures))
            .collect();
        call_graph.sort();
        call_graph.dedup();

        let mut docs: BTreeMap<DocTier, BTreeMap<String, DocSummary>> = BTreeMap::new();
        for (path, (tier, summary)) in &analysis.docs {
            docs.entry(*tier).or_default().insert(path.clone(), summary.clone());
        }

        let legacy = LegacyIndex {
            version: LEGACY_VERSION.to_string(),
            at: timestamp(),
            root: root_name(&root),
            tree: tree::generate_tree(&root_name(&root), &files, self.config.tree_depth),
            stats: compute_stats(&analysis, file_source, detection.as_ref()),
            files: analysis.details.clone(),
            call_graph,
            docs,
        };

        let store = IndexStore::new(&root);
        store.write_legacy(&legacy).context("Failed to write legacy index")?;
        if store.detail_dir().exists() {
            store.clear_stale_shards(&BTreeSet::new())?;
            if let Err(e) = std::fs::remove_dir(store.detail_dir()) {
                log::debug!("Keeping {}: {}", store.detail_dir().display(), e);
            }
        }

        save_cache(&mut cache);
        Ok((legacy, analysis.skipped))
    }

    /// Discover indexable files, preferring git's file list
    pub fn discover_files(&self, root: &Path) -> Result<(Vec<String>, FileSource)> {
        let git = Git::new(root, self.git_timeout());

        let (candidates, source) = if git.is_repo() {
            match git.list_files() {
                Ok(files) => (files, FileSource::Git),
                Err(e) => {
                    log::warn!("git ls-files failed ({:#}); walking the directory instead", e);
                    (walk_files(root)?, FileSource::Walk)
                }
            }
        } else {
            log::debug!("Not a git repository, walking the directory");
            (walk_files(root)?, FileSource::Walk)
        };

        let mut files: Vec<String> = candidates
            .into_iter()
            .filter(|path| self.should_index(root, path))
            .collect();
        files.sort();
        files.dedup();

        Ok((files, source))
    }

    /// Check if a relative path is indexable under the current config
    pub fn should_index(&self, root: &Path, path: &str) -> bool {
        if is_index_output(path) || path.split('/').any(|c| EXCLUDED_DIRS.contains(&c)) {
            return false;
        }
        if Language::from_path(path).is_none() {
            return false;
        }

        match std::fs::metadata(root.join(path)) {
            Ok(metadata) if metadata.is_file() => {
                if metadata.len() > self.config.max_file_size {
                    log::debug!("Skipping {} (too large: {} bytes)", path, metadata.len());
                    return false;
                }
                true
            }
            _ => false,
        }
    }

    /// Most recent commit per file; empty when git is unavailable
    pub fn git_metadata(&self, root: &Path, source: FileSource) -> HashMap<String, GitInfo> {
        if source != FileSource::Git {
            return HashMap::new();
        }
        match Git::new(root, self.git_timeout()).file_metadata() {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Git metadata unavailable: {:#}", e);
                HashMap::new()
            }
        }
    }

    pub fn doc_classifier(&self) -> DocClassifier {
        DocClassifier::new(&self.config.doc_tiers).unwrap_or_else(|e| {
            log::warn!("{:#} (using default doc tiers)", e);
            DocClassifier::with_defaults()
        })
    }

    /// Splitting parameters, honouring a framework depth hint
    pub fn organizer(&self, detection: Option<&Detection>) -> Organizer {
        let hint = detection.map(|d| d.preset.max_depth);
        Organizer::new(&self.config.submodule, self.config.effective_max_depth(hint))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.config.git_timeout_secs)
    }

    /// Extract signatures and doc summaries for `files`
    ///
    /// Cache lookups and extraction run on a bounded rayon pool; cache
    /// writes happen afterwards on this thread.
    pub fn analyze(
        &self,
        root: &Path,
        files: &[String],
        cache: &mut SignatureCache,
        git_info: &HashMap<String, GitInfo>,
        classifier: &DocClassifier,
    ) -> Result<Analysis> {
        let num_threads = if self.config.parallel_threads == 0 {
            let available_cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            // Use 80% of available cores (minimum 1)
            ((available_cores as f64 * 0.8).ceil() as usize).max(1)
        } else {
            self.config.parallel_threads
        };
        log::debug!("Using {} threads for extraction", num_threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .context("Failed to create thread pool")?;

        let pb = self.progress_bar(files.len());
        let shared_cache: &SignatureCache = cache;

        let outcomes: Vec<(String, Language, FileOutcome)> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|path| {
                    let language = Language::from_path(path)?;
                    let outcome =
                        self.analyze_file(&root.join(path), language, shared_cache, classifier, path);
                    pb.inc(1);
                    Some((path.clone(), language, outcome))
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut analysis = Analysis::default();
        for (path, language, outcome) in outcomes {
            let git = git_info.get(&path).cloned();
            let detail = match outcome {
                FileOutcome::Doc(tier, summary) => {
                    analysis.docs.insert(path.clone(), (tier, summary));
                    FileDetail {
                        lang: language,
                        signatures: Signatures::default(),
                        listed_only: false,
                        git,
                    }
                }
                FileOutcome::Cached(signatures) => FileDetail {
                    lang: language,
                    signatures,
                    listed_only: false,
                    git,
                },
                FileOutcome::Extracted(key, signatures) => {
                    if let Some(key) = key {
                        cache.put(key, signatures.clone());
                    }
                    FileDetail {
                        lang: language,
                        signatures,
                        listed_only: false,
                        git,
                    }
                }
                FileOutcome::Unsupported => FileDetail {
                    git,
                    ..FileDetail::listed_only(language)
                },
                FileOutcome::Failed(reason) => {
                    log::warn!("Listing {} without details: {}", path, reason);
                    analysis.skipped += 1;
                    FileDetail {
                        git,
                        ..FileDetail::listed_only(language)
                    }
                }
            };
            analysis.details.insert(path, detail);
        }

        let stats = cache.stats();
        log::info!(
            "Analyzed {} files (cache: {} hits, {} misses)",
            analysis.details.len(),
            stats.hits,
            stats.misses
        );

        Ok(analysis)
    }

    fn analyze_file(
        &self,
        abs_path: &Path,
        language: Language,
        cache: &SignatureCache,
        classifier: &DocClassifier,
        rel_path: &str,
    ) -> FileOutcome {
        if language.is_doc() {
            return match std::fs::read_to_string(abs_path) {
                Ok(content) => FileOutcome::Doc(classifier.classify(rel_path), summarize(&content)),
                Err(_) => FileOutcome::Doc(classifier.classify(rel_path), DocSummary::default()),
            };
        }

        if !self.registry.supports(language) {
            return FileOutcome::Unsupported;
        }

        let key = SignatureCache::cache_key(abs_path);
        if let Some(signatures) = key.as_deref().and_then(|k| cache.get(k)) {
            return FileOutcome::Cached(signatures);
        }

        let source = match std::fs::read_to_string(abs_path) {
            Ok(source) => source,
            Err(e) => return FileOutcome::Failed(format!("unreadable: {}", e)),
        };

        match self.registry.extract(language, &source) {
            Ok(Some(signatures)) => {
                log::debug!("Extracted {} functions from {}", signatures.function_count(), rel_path);
                FileOutcome::Extracted(key, signatures)
            }
            Ok(None) => FileOutcome::Unsupported,
            Err(e) => FileOutcome::Failed(format!("{:#}", e)),
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// `[caller, callee]` edges of one file
pub fn call_edges(signatures: &Signatures) -> Vec<CallEdge> {
    signatures
        .callables()
        .into_iter()
        .flat_map(|(caller, sig)| {
            sig.calls
                .iter()
                .map(move |callee| (caller.clone(), callee.clone()))
        })
        .collect()
}

/// Detail Shard for one module; deterministic for identical input
pub fn build_shard(module_id: &str, files: &[String], analysis: &Analysis) -> DetailShard {
    let mut details = BTreeMap::new();
    let mut defined: BTreeSet<String> = BTreeSet::new();

    for path in files {
        if let Some(detail) = analysis.details.get(path) {
            defined.extend(detail.signatures.defined_names());
            details.insert(path.clone(), detail.clone());
        }
    }

    let mut local = Vec::new();
    let mut external = Vec::new();
    for detail in details.values() {
        for edge in call_edges(&detail.signatures) {
            if defined.contains(&edge.1) {
                local.push(edge);
            } else {
                external.push(edge);
            }
        }
    }
    local.sort();
    local.dedup();
    external.sort();
    external.dedup();

    let mut doc_standard = BTreeMap::new();
    let mut doc_archive = BTreeMap::new();
    for path in files {
        match analysis.docs.get(path) {
            Some((DocTier::Standard, summary)) => {
                doc_standard.insert(path.clone(), summary.clone());
            }
            Some((DocTier::Archive, summary)) => {
                doc_archive.insert(path.clone(), summary.clone());
            }
            _ => {}
        }
    }

    DetailShard {
        module_id: module_id.to_string(),
        version: SHARD_VERSION.to_string(),
        files: details,
        call_graph_local: local,
        call_graph_external: external,
        doc_standard,
        doc_archive,
    }
}

/// Assemble the Core Index from modules, analysis and shard hashes
pub fn assemble_core(
    root: &Path,
    modules: &ModuleMap,
    analysis: &Analysis,
    module_hashes: BTreeMap<String, String>,
    file_source: FileSource,
    detection: Option<&Detection>,
    config: &IndexConfig,
) -> CoreIndex {
    let name = root_name(root);
    let all_files: Vec<String> = modules.values().flatten().cloned().collect();

    let module_entries: BTreeMap<String, ModuleEntry> = modules
        .iter()
        .map(|(id, files)| {
            let function_count = files
                .iter()
                .filter_map(|f| analysis.details.get(f))
                .map(|d| d.signatures.function_count())
                .sum();
            let entry = ModuleEntry {
                file_count: files.len(),
                function_count,
                detail_path: IndexStore::detail_rel_path(id),
                files: files.clone(),
            };
            (id.clone(), entry)
        })
        .collect();

    let mut by_tier: BTreeMap<DocTier, BTreeMap<String, DocSummary>> = BTreeMap::new();
    for (path, (tier, summary)) in &analysis.docs {
        by_tier.entry(*tier).or_default().insert(path.clone(), summary.clone());
    }
    let d_critical = by_tier.remove(&DocTier::Critical).unwrap_or_default();
    let (d_standard, d_archive) = if config.include_all_doc_tiers {
        (
            Some(by_tier.remove(&DocTier::Standard).unwrap_or_default()),
            Some(by_tier.remove(&DocTier::Archive).unwrap_or_default()),
        )
    } else {
        (None, None)
    };

    let priority_modules = detection
        .map(|d| {
            d.priority_module_prefixes()
                .into_iter()
                .filter(|prefix| {
                    modules
                        .keys()
                        .any(|id| id == prefix || id.starts_with(&format!("{}-", prefix)))
                })
                .collect()
        })
        .unwrap_or_default();

    CoreIndex {
        version: SPLIT_VERSION.to_string(),
        at: timestamp(),
        root: name.clone(),
        tree: tree::generate_tree(&name, &all_files, config.tree_depth),
        stats: compute_stats(analysis, file_source, detection),
        file_to_module_map: build_file_to_module_map(modules),
        modules: module_entries,
        module_hashes,
        d_critical,
        d_standard,
        d_archive,
        priority_modules,
    }
}

/// Aggregate counts over an analysis
pub fn compute_stats(
    analysis: &Analysis,
    file_source: FileSource,
    detection: Option<&Detection>,
) -> IndexStats {
    let mut files_by_language: BTreeMap<String, usize> = BTreeMap::new();
    for detail in analysis.details.values() {
        *files_by_language.entry(detail.lang.to_string()).or_default() += 1;
    }

    let mut doc_tiers: BTreeMap<String, usize> = BTreeMap::new();
    for (tier, _) in analysis.docs.values() {
        *doc_tiers.entry(tier.to_string()).or_default() += 1;
    }

    let files = analysis.files();
    IndexStats {
        total_files: files.len(),
        total_dirs: tree::count_dirs(&files),
        files_by_language,
        doc_tiers,
        file_source,
        listed_only: analysis.details.values().filter(|d| d.listed_only).count(),
        framework: detection.map(|d| d.preset.name.to_string()),
    }
}

/// RFC 3339 timestamp used as the `at` anchor
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Display name of the indexed directory
pub fn root_name(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(".")
        .to_string()
}

/// Canonical root; the only fatal failure of a full build
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("Cannot access project root {}", root.display()))?;
    std::fs::read_dir(&root).with_context(|| format!("Cannot read project root {}", root.display()))?;
    Ok(root)
}

/// Index outputs are never indexed themselves
pub fn is_index_output(path: &str) -> bool {
    path == CORE_FILE || path == BACKUP_FILE || path.starts_with(&format!("{}/", DETAIL_DIR))
}

fn walk_files(root: &Path) -> Result<Vec<String>> {
    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .is_none_or(|name| !EXCLUDED_DIRS.contains(&name))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.context("Failed to walk project directory")?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        files.push(rel.join("/"));
    }

    Ok(files)
}

fn save_cache(cache: &mut SignatureCache) {
    if let Err(e) = cache.save() {
        log::warn!("Failed to save signature cache: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunctionSig;
    use tempfile::TempDir;

    fn sig_with_calls(name: &str, calls: &[&str]) -> Signatures {
        let mut sig = Signatures::default();
        sig.functions.insert(
            name.to_string(),
            FunctionSig {
                line: 1,
                signature: format!("fn {}()", name),
                calls: calls.iter().map(|c| c.to_string()).collect(),
                doc: None,
            },
        );
        sig
    }

    fn detail(signatures: Signatures) -> FileDetail {
        FileDetail {
            lang: Language::Rust,
            signatures,
            listed_only: false,
            git: None,
        }
    }

    #[test]
    fn test_build_shard_splits_edges() {
        let mut analysis = Analysis::default();
        analysis
            .details
            .insert("src/a.rs".into(), detail(sig_with_calls("login", &["validate", "log"])));
        analysis
            .details
            .insert("src/b.rs".into(), detail(sig_with_calls("validate", &["check"])));

        let files = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
        let shard = build_shard("src", &files, &analysis);

        assert_eq!(shard.call_graph_local, vec![("login".into(), "validate".into())]);
        assert_eq!(
            shard.call_graph_external,
            vec![("login".into(), "log".into()), ("validate".into(), "check".into())]
        );
        assert_eq!(shard.files.len(), 2);
    }

    #[test]
    fn test_discover_files_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join(DETAIL_DIR)).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(root.join("src/data.bin"), [0u8; 4]).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::write(root.join(DETAIL_DIR).join("src.json"), "{}").unwrap();
        std::fs::write(root.join("README.md"), "# Demo").unwrap();
        std::fs::write(root.join("big.py"), "x = 1\n".repeat(100)).unwrap();

        let config = IndexConfig {
            max_file_size: 100,
            ..IndexConfig::default()
        };
        let (files, _) = Indexer::new(config).discover_files(root).unwrap();
        assert_eq!(files, vec!["README.md", "src/main.rs"]);
    }

    #[test]
    fn test_analyze_downgrades_failures() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("ok.py"), "def f():\n    g()\n").unwrap();
        std::fs::write(root.join("bad.py"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(root.join("notes.md"), "# Notes\n## Todo\n").unwrap();

        let indexer = Indexer::new(IndexConfig::default());
        let mut cache = SignatureCache::in_memory();
        let files: Vec<String> = vec!["bad.py".into(), "notes.md".into(), "ok.py".into()];
        let analysis = indexer
            .analyze(root, &files, &mut cache, &HashMap::new(), &DocClassifier::with_defaults())
            .unwrap();

        assert_eq!(analysis.skipped, 1);
        assert!(analysis.details["bad.py"].listed_only);
        assert_eq!(analysis.details["ok.py"].signatures.functions["f"].calls, vec!["g"]);
        assert_eq!(analysis.docs["notes.md"].1.title.as_deref(), Some("Notes"));
        assert_eq!(cache.stats().entries, 1);
    }

    /// Shell extractor that rewrites its file while the first extraction runs
    struct RewritingExtractor {
        path: PathBuf,
        rewritten: std::sync::atomic::AtomicBool,
    }

    impl crate::extractors::Extractor for RewritingExtractor {
        fn languages(&self) -> &[Language] {
            &[Language::Shell]
        }

        fn extract(&self, source: &str) -> Result<Signatures> {
            if !self.rewritten.swap(true, std::sync::atomic::Ordering::SeqCst) {
                std::fs::write(&self.path, "echo hello, world again\n")?;
            }
            let mut sig = Signatures::default();
            sig.functions
                .insert(format!("len{}", source.len()), FunctionSig::default());
            Ok(sig)
        }
    }

    #[test]
    fn test_file_changed_during_extraction_is_reextracted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("a.sh"), "echo hello\n").unwrap();

        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(RewritingExtractor {
            path: root.join("a.sh"),
            rewritten: std::sync::atomic::AtomicBool::new(false),
        });
        let indexer = Indexer::new(IndexConfig::default()).with_registry(registry);
        let mut cache = SignatureCache::in_memory();
        let files = vec!["a.sh".to_string()];
        let classifier = DocClassifier::with_defaults();

        let first = indexer
            .analyze(root, &files, &mut cache, &HashMap::new(), &classifier)
            .unwrap();
        let names: Vec<&String> = first.details["a.sh"].signatures.functions.keys().collect();
        assert_eq!(names, vec!["len11"]);

        // The entry belongs to the old file state; the new state must miss
        let second = indexer
            .analyze(root, &files, &mut cache, &HashMap::new(), &classifier)
            .unwrap();
        let names: Vec<&String> = second.details["a.sh"].signatures.functions.keys().collect();
        assert_eq!(names, vec!["len24"]);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_legacy_build_drops_shard_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.py"), "def a():\n    pass\n").unwrap();
        let indexer = Indexer::new(IndexConfig::default());
        let store = IndexStore::new(root);

        indexer.build(root).unwrap();
        std::fs::write(store.detail_dir().join("notes.txt"), "keep me").unwrap();
        indexer.build_legacy(root).unwrap();
        assert!(!store.shard_path("src").exists());
        assert!(store.detail_dir().join("notes.txt").exists());

        indexer.build(root).unwrap();
        std::fs::remove_file(store.detail_dir().join("notes.txt")).unwrap();
        indexer.build_legacy(root).unwrap();
        assert!(!store.detail_dir().exists());
    }

    #[test]
    fn test_is_index_output() {
        assert!(is_index_output("PROJECT_INDEX.json"));
        assert!(is_index_output("PROJECT_INDEX.d/src.json"));
        assert!(!is_index_output("src/PROJECT_INDEX.json"));
    }
}

//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{IndexConfig, Mode};
use crate::error::IndexError;
use crate::incremental::{self, UpdateOutcome};
use crate::indexer::Indexer;
use crate::migrate::{self, MigrateOutcome};
use crate::output;
use crate::query::{self, LazyLoader, QueryTools, RelevanceQuery, RelevanceScorer};
use crate::store::IndexStore;

/// pidx: size-bounded project index for AI agents
#[derive(Parser, Debug)]
#[command(
    name = "pidx",
    version,
    about = "Build and maintain a split, size-bounded index of a source tree",
    long_about = "pidx writes a compact Core Index (PROJECT_INDEX.json) plus one Detail Shard \
                  per module (PROJECT_INDEX.d/) so an agent can browse a codebase without \
                  loading it whole.\n\n\
                  Run 'pidx' with no arguments to build or update the index of the current \
                  directory."
)]
pub struct Cli {
    /// Project root
    #[arg(short = 'C', long = "root", value_name = "PATH", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Output layout: auto, split or single
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<Mode>,

    /// File count at which auto mode switches to the split layout
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub threshold: Option<u64>,

    /// Only run an incremental update; fail if that is impossible
    #[arg(long, conflicts_with = "full")]
    pub incremental: bool,

    /// Always run a full rebuild
    #[arg(long)]
    pub full: bool,

    /// Write the Core Index only, without Detail Shards
    #[arg(long)]
    pub skip_details: bool,

    /// Convert a legacy single-file index into the split layout
    #[arg(long, conflicts_with_all = ["incremental", "full"])]
    pub migrate: bool,

    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress bars and summaries
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the query operations as JSON-RPC tools over stdio
    Serve,

    /// Search indexed file paths (substring, or glob with * and ?)
    Search {
        pattern: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show signatures, module and git metadata of one file
    Info { path: String },

    /// Functions affected by a change to FUNCTION (reverse call graph)
    Impact {
        function: String,

        /// Maximum caller depth
        #[arg(short, long, default_value_t = query::DEFAULT_MAX_DEPTH)]
        depth: usize,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank modules by relevance to a free-text query
    Relevant {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of modules to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check shard hashes and the file/module partition
    Verify,
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    value
        .parse::<Mode>()
        .map_err(|_| format!("invalid mode '{}' (expected auto, split or single)", value))
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",  // Default: only warnings and errors
            1 => "info",  // -v: show info messages
            2 => "debug", // -vv: show debug messages
            _ => "trace", // -vvv: show trace messages
        };
        // The tool server owns stdout, so logs always go to stderr
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .target(env_logger::Target::Stderr)
            .init();

        match &self.command {
            None if self.migrate => self.handle_migrate(),
            None => self.handle_build(),
            Some(Command::Serve) => crate::mcp::run_server(&self.root),
            Some(Command::Search { pattern, limit }) => {
                print_tool_output(QueryTools::new(&self.root).search_files(pattern, *limit))
            }
            Some(Command::Info { path }) => print_tool_output(QueryTools::new(&self.root).get_file_info(path)),
            Some(Command::Impact { function, depth, json }) => handle_impact(&self.root, function, *depth, *json),
            Some(Command::Relevant { query, limit, json }) => {
                handle_relevant(&self.root, &query.join(" "), *limit, *json)
            }
            Some(Command::Verify) => handle_verify(&self.root, self.quiet),
        }
    }

    /// Project config with command-line overrides applied
    fn config(&self) -> IndexConfig {
        let mut config = IndexConfig::load(&self.root);
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold as usize;
        }
        if self.skip_details {
            config.skip_details = true;
        }
        config
    }

    fn handle_build(&self) -> Result<()> {
        let start = Instant::now();
        let indexer = Indexer::new(self.config()).with_progress(!self.quiet);
        let store = IndexStore::new(&self.root);

        let split = match indexer.config().mode {
            Mode::Split => true,
            Mode::Single => false,
            Mode::Auto => {
                if store.is_split() {
                    true
                } else {
                    let (files, _) = indexer.discover_files(&self.root)?;
                    log::info!(
                        "Auto mode: {} files (split threshold {})",
                        files.len(),
                        indexer.config().threshold
                    );
                    files.len() >= indexer.config().threshold
                }
            }
        };

        if !split {
            if self.incremental {
                anyhow::bail!("Incremental updates require the split layout (use --mode split)");
            }
            let (legacy, skipped) = indexer.build_legacy(&self.root)?;
            if !self.quiet {
                println!("Index written: {} (single file)", store.core_path().display());
                println!("  Files indexed: {}", legacy.stats.total_files);
                print_skipped(skipped);
                println!("  Time: {:.2?}", start.elapsed());
            }
            return Ok(());
        }

        if !self.full && store.is_split() && !indexer.config().skip_details {
            match incremental::update(&indexer, &self.root) {
                Ok(outcome) => {
                    if !self.quiet {
                        print_update(&outcome, start);
                    }
                    return Ok(());
                }
                Err(e) if self.incremental => return Err(e.context("Incremental update failed")),
                Err(e) => match e.downcast_ref::<IndexError>() {
                    // Expected: no git, stale or older index
                    Some(ie) if ie.requires_full_rebuild() => {
                        log::info!("Incremental update not possible: {}", ie);
                        if !self.quiet {
                            output::info(&format!("Incremental update not possible ({}), rebuilding", ie));
                        }
                    }
                    _ => {
                        log::warn!("Incremental update failed: {:#}", e);
                        if !self.quiet {
                            output::warn(&format!("Incremental update failed ({:#}), rebuilding", e));
                        }
                    }
                },
            }
        } else if self.incremental {
            anyhow::bail!(
                "No split index with detail shards at {}; run a full build first",
                store.core_path().display()
            );
        }

        let (core, skipped) = indexer.build(&self.root)?;
        if !self.quiet {
            println!("Index written: {}", store.core_path().display());
            println!("  Files indexed: {}", core.stats.total_files);
            println!("  Modules: {}", core.modules.len());
            if let Some(framework) = &core.stats.framework {
                println!("  Layout: {}", framework);
            }
            print_skipped(skipped);
            println!("  Time: {:.2?}", start.elapsed());
        }

        Ok(())
    }

    fn handle_migrate(&self) -> Result<()> {
        let indexer = Indexer::new(self.config());
        match migrate::migrate(&indexer, &self.root).context("Migration failed")? {
            MigrateOutcome::AlreadySplit => {
                if !self.quiet {
                    output::info("Index already uses the split layout, nothing to migrate.");
                }
            }
            MigrateOutcome::Migrated { core } => {
                if !self.quiet {
                    println!("Migrated to split layout");
                    println!("  Files: {}", core.stats.total_files);
                    println!("  Modules: {}", core.modules.len());
                    println!("  Backup: {}", IndexStore::new(&self.root).backup_path().display());
                }
            }
        }
        Ok(())
    }
}

fn print_skipped(skipped: usize) {
    if skipped > 0 {
        println!("  Listed without details: {}", skipped);
    }
}

fn print_update(outcome: &UpdateOutcome, start: Instant) {
    match outcome {
        UpdateOutcome::NoChanges => println!("Index is up to date"),
        UpdateOutcome::Updated { modules, changed_files } => {
            println!("Index updated incrementally");
            println!("  Changed files: {}", changed_files.len());
            println!("  Regenerated modules: {}", modules.join(", "));
            println!("  Time: {:.2?}", start.elapsed());
        }
    }
}

/// Print a tool response; an `error` field becomes a command failure
fn print_tool_output(response: String) -> Result<()> {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&response) {
        if let Some(Value::String(error)) = fields.get("error") {
            anyhow::bail!("{}", error);
        }
    }
    println!("{}", response);
    Ok(())
}

fn handle_impact(root: &Path, function: &str, depth: usize, as_json: bool) -> Result<()> {
    let mut loader = LazyLoader::new(root);
    let shards = loader.load_all()?;
    let graph = query::call_graph(&shards);
    log::debug!("Call graph has {} functions across {} modules", graph.len(), shards.len());

    let report = graph.analyze(function, depth);
    if as_json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!("Impact of changing '{}'", report.target);
    println!("  Direct callers ({}):", report.direct.len());
    for name in &report.direct {
        println!("    {}", name);
    }
    println!("  Indirect callers ({}):", report.indirect.len());
    for name in &report.indirect {
        println!("    {}", name);
    }
    println!("  Total affected: {}", report.total_affected);
    Ok(())
}

fn handle_relevant(root: &Path, text: &str, limit: usize, as_json: bool) -> Result<()> {
    let mut loader = LazyLoader::new(root);
    let core = loader.load_core()?;
    let shards = loader.load_all()?;
    let changed_at = query::change_times(&shards);

    let query = RelevanceQuery::parse(text);
    let mut scores = RelevanceScorer::default().score_modules(&core, &query, &changed_at);
    scores.truncate(limit);

    if as_json {
        println!("{}", serde_json::to_string(&scores)?);
        return Ok(());
    }

    if scores.is_empty() {
        output::info("No module matches the query.");
        return Ok(());
    }
    for score in &scores {
        println!("{:>4}  {}  ({} files)", score.score, score.module_id, score.files.len());
    }
    Ok(())
}

fn handle_verify(root: &Path, quiet: bool) -> Result<()> {
    let core = query::load_core(root)?;
    let problems = IndexStore::new(root).integrity_problems(&core);

    if problems.is_empty() {
        if !quiet {
            println!(
                "Index OK: {} modules, {} files, {} shard hashes verified",
                core.modules.len(),
                core.stats.total_files,
                core.module_hashes.len()
            );
        }
        return Ok(());
    }

    for problem in &problems {
        output::warn(problem);
    }
    Err(IndexError::IntegrityViolation { problems }.into())
}

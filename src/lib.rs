//! project-index: a size-bounded structural index of a source tree
//!
//! The index is split into a compact Core Index (`PROJECT_INDEX.json`) that
//! an agent always loads, and one Detail Shard per module
//! (`PROJECT_INDEX.d/<module_id>.json`) loaded on demand.
//!
//! # Architecture
//!
//! - **Extractors**: per-language signature scanners behind one trait
//! - **Signature cache**: memo of extractor output keyed by path, mtime and size
//! - **Organizer**: groups files into modules and splits large ones
//! - **Indexer**: full builds (shards first, Core Index last)
//! - **Incremental**: git-driven selective regeneration with rollback
//! - **Query**: lazy shard loading, relevance ranking, impact analysis
//!
//! # Example Usage
//!
//! ```no_run
//! use project_index::{config::IndexConfig, indexer::Indexer, query::LazyLoader};
//!
//! let indexer = Indexer::new(IndexConfig::load(".".as_ref()));
//! let (core, skipped) = indexer.build(".".as_ref()).unwrap();
//! println!("{} modules, {} files listed only", core.modules.len(), skipped);
//!
//! let mut loader = LazyLoader::new(".");
//! let shard = loader.load_module("src").unwrap();
//! println!("{} files in src", shard.files.len());
//! ```

pub mod cli;
pub mod config;
pub mod docs;
pub mod error;
pub mod extractors;
pub mod framework;
pub mod git;
pub mod incremental;
pub mod indexer;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod organizer;
pub mod output;
pub mod query;
pub mod signature_cache;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use config::IndexConfig;
pub use error::IndexError;
pub use incremental::UpdateOutcome;
pub use indexer::Indexer;
pub use models::{CoreIndex, DetailShard, Language};
pub use query::{LazyLoader, QueryTools};
pub use store::IndexStore;

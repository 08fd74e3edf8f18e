//! Read side of the index
//!
//! Agents load the Core Index first, pick modules (optionally ranked by the
//! relevance scorer), then load only those Detail Shards. Impact analysis
//! runs over the call graphs of the loaded shards.

pub mod impact;
pub mod loader;
pub mod relevance;
pub mod tools;

pub use impact::{ImpactReport, ReverseCallGraph, DEFAULT_MAX_DEPTH};
pub use loader::{load_core, LazyLoader};
pub use relevance::{ModuleScore, RelevanceQuery, RelevanceScorer, RelevanceWeights};
pub use tools::QueryTools;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::DetailShard;

/// Reverse call graph over every edge of the given shards
pub fn call_graph(shards: &BTreeMap<String, Arc<DetailShard>>) -> ReverseCallGraph {
    ReverseCallGraph::from_edges(
        shards
            .values()
            .flat_map(|shard| shard.all_edges())
            .map(|(caller, callee)| (caller.as_str(), callee.as_str())),
    )
}

/// Last commit time per file, from the git metadata in the shards
pub fn change_times(shards: &BTreeMap<String, Arc<DetailShard>>) -> BTreeMap<String, DateTime<Utc>> {
    relevance::parse_change_times(shards.values().flat_map(|shard| {
        shard
            .files
            .iter()
            .filter_map(|(path, detail)| detail.git.as_ref().map(|git| (path, git.date.as_str())))
    }))
}

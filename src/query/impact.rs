//! Call-graph impact analysis
//!
//! Answers "what could break if this function changes": callers of the
//! target are direct impact, their callers (transitively, up to a depth
//! limit) are indirect impact.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Default traversal depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    pub target: String,
    pub direct: Vec<String>,
    pub indirect: Vec<String>,
    pub total_affected: usize,
}

/// Reverse call graph: callee → callers, stored as an arena of names
#[derive(Debug, Default)]
pub struct ReverseCallGraph {
    names: Vec<String>,
    ids: HashMap<String, usize>,
    callers: Vec<Vec<usize>>,
}

impl ReverseCallGraph {
    /// Build from `(caller, callee)` pairs; empty names are skipped
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = Self::default();
        for (caller, callee) in edges {
            if caller.is_empty() || callee.is_empty() {
                log::debug!("Skipping malformed call edge [{:?}, {:?}]", caller, callee);
                continue;
            }
            graph.add_edge(caller, callee);
        }
        graph
    }

    /// Build from raw JSON edges; anything but a pair of strings is skipped
    pub fn from_json(edges: &[Value]) -> Self {
        let pairs: Vec<(&str, &str)> = edges
            .iter()
            .filter_map(|edge| match edge.as_array().map(Vec::as_slice) {
                Some([Value::String(caller), Value::String(callee)]) => Some((caller.as_str(), callee.as_str())),
                _ => {
                    log::debug!("Skipping malformed call edge {}", edge);
                    None
                }
            })
            .collect();
        Self::from_edges(pairs)
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        self.callers.push(Vec::new());
        id
    }

    fn add_edge(&mut self, caller: &str, callee: &str) {
        let caller = self.node(caller);
        let callee = self.node(callee);
        if !self.callers[callee].contains(&caller) {
            self.callers[callee].push(caller);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Breadth-first walk through callers of `target`
    ///
    /// Every node is visited at most once, so cycles and self-calls
    /// terminate. Unknown targets have no impact.
    pub fn analyze(&self, target: &str, max_depth: usize) -> ImpactReport {
        let mut direct = Vec::new();
        let mut indirect = Vec::new();

        if let Some(&start) = self.ids.get(target) {
            let mut visited = vec![false; self.names.len()];
            visited[start] = true;
            let mut queue = VecDeque::from([(start, 0usize)]);

            while let Some((node, depth)) = queue.pop_front() {
                if depth >= max_depth {
                    continue;
                }
                for &caller in &self.callers[node] {
                    if visited[caller] {
                        continue;
                    }
                    visited[caller] = true;

                    let name = self.names[caller].clone();
                    if depth == 0 {
                        direct.push(name);
                    } else {
                        indirect.push(name);
                    }
                    queue.push_back((caller, depth + 1));
                }
            }
        }

        direct.sort();
        indirect.sort();
        ImpactReport {
            target: target.to_string(),
            total_affected: direct.len() + indirect.len(),
            direct,
            indirect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_and_indirect() {
        let edges = json!([["login", "validate"], ["register", "validate"], ["validate", "check"]]);
        let graph = ReverseCallGraph::from_json(edges.as_array().unwrap());

        let report = graph.analyze("check", DEFAULT_MAX_DEPTH);
        assert_eq!(report.direct, vec!["validate"]);
        assert_eq!(report.indirect, vec!["login", "register"]);
        assert_eq!(report.total_affected, 3);
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = ReverseCallGraph::from_edges([("A", "B"), ("B", "A"), ("A", "A")]);
        let report = graph.analyze("A", DEFAULT_MAX_DEPTH);
        assert_eq!(report.direct, vec!["B"]);
        assert!(report.indirect.is_empty());
        assert_eq!(report.total_affected, 1);
    }

    #[test]
    fn test_malformed_and_duplicate_edges() {
        let edges = json!([["a", "b"], ["a", "b"], ["x"], [1, 2], "c->d", ["", "b"]]);
        let graph = ReverseCallGraph::from_json(edges.as_array().unwrap());
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.analyze("b", DEFAULT_MAX_DEPTH).direct, vec!["a"]);
    }

    #[test]
    fn test_depth_limit() {
        let graph = ReverseCallGraph::from_edges([("d", "c"), ("c", "b"), ("b", "a")]);
        let report = graph.analyze("a", 2);
        assert_eq!(report.direct, vec!["b"]);
        assert_eq!(report.indirect, vec!["c"]);
        assert_eq!(graph.analyze("missing", 10).total_affected, 0);
    }
}

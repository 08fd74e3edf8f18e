//! Module relevance scoring
//!
//! A module's score is the sum over its files of:
//! - `explicit_ref` when the query names the file
//! - `recent_week` / `recent_month` when it changed in the last 7 / 30 days
//! - `keyword` when any query term appears in its path
//!
//! The recency bonuses are mutually exclusive; older files add nothing.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CoreIndex, Language};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelevanceWeights {
    pub explicit_ref: u32,
    pub recent_week: u32,
    pub recent_month: u32,
    pub keyword: u32,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            explicit_ref: 10,
            recent_week: 5,
            recent_month: 2,
            keyword: 1,
        }
    }
}

/// Parsed query: lowercase terms plus path-like references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceQuery {
    pub terms: Vec<String>,
    pub explicit_refs: Vec<String>,
}

impl RelevanceQuery {
    /// Split free text; words that look like paths become explicit references
    pub fn parse(text: &str) -> Self {
        let mut query = Self::default();
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| matches!(c, ',' | ';' | '"' | '\'' | '`' | '(' | ')'));
            if word.is_empty() {
                continue;
            }
            if word.contains('/') || Language::from_path(word).is_some() {
                query.explicit_refs.push(word.trim_start_matches("./").to_string());
            }
            let term = word.to_lowercase();
            if term.len() >= 2 && !query.terms.contains(&term) {
                query.terms.push(term);
            }
        }
        query
    }

    /// The file is named by an explicit reference (whole path or path suffix)
    pub fn references(&self, path: &str) -> bool {
        self.explicit_refs
            .iter()
            .any(|r| path == r || path.ends_with(&format!("/{}", r)))
    }

    pub fn matches_keyword(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.terms.iter().any(|term| path.contains(term.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleScore {
    pub module_id: String,
    pub score: u32,
    /// Files that contributed to the score
    pub files: Vec<String>,
}

pub struct RelevanceScorer {
    weights: RelevanceWeights,
    now: DateTime<Utc>,
}

impl RelevanceScorer {
    pub fn new(weights: RelevanceWeights) -> Self {
        Self {
            weights,
            now: Utc::now(),
        }
    }

    /// Fix the reference time (for reproducible scores)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Score every module; zero scores are dropped
    ///
    /// `changed_at` maps files to their last change time, usually from the
    /// git metadata stored in the shards. Results are sorted by score
    /// (descending), then module id.
    pub fn score_modules(
        &self,
        core: &CoreIndex,
        query: &RelevanceQuery,
        changed_at: &BTreeMap<String, DateTime<Utc>>,
    ) -> Vec<ModuleScore> {
        let mut scores: Vec<ModuleScore> = core
            .modules
            .iter()
            .filter_map(|(id, entry)| {
                let mut score = 0;
                let mut contributing = BTreeSet::new();
                for file in &entry.files {
                    let file_score = self.score_file(file, query, changed_at.get(file));
                    if file_score > 0 {
                        score += file_score;
                        contributing.insert(file.clone());
                    }
                }
                (score > 0).then(|| ModuleScore {
                    module_id: id.clone(),
                    score,
                    files: contributing.into_iter().collect(),
                })
            })
            .collect();

        scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.module_id.cmp(&b.module_id)));
        scores
    }

    pub fn score_file(&self, path: &str, query: &RelevanceQuery, changed_at: Option<&DateTime<Utc>>) -> u32 {
        let mut score = 0;

        if query.references(path) {
            score += self.weights.explicit_ref;
        }

        if let Some(changed) = changed_at {
            let age = self.now.signed_duration_since(*changed);
            if age <= Duration::days(7) {
                score += self.weights.recent_week;
            } else if age <= Duration::days(30) {
                score += self.weights.recent_month;
            }
        }

        if query.matches_keyword(path) {
            score += self.weights.keyword;
        }

        score
    }
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(RelevanceWeights::default())
    }
}

/// Parse RFC 3339 commit dates, skipping anything unparseable
pub fn parse_change_times<'a>(
    dates: impl IntoIterator<Item = (&'a String, &'a str)>,
) -> BTreeMap<String, DateTime<Utc>> {
    dates
        .into_iter()
        .filter_map(|(path, date)| {
            DateTime::parse_from_rfc3339(date)
                .ok()
                .map(|d| (path.clone(), d.with_timezone(&Utc)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexStats, ModuleEntry, SPLIT_VERSION};

    fn core(modules: &[(&str, &[&str])]) -> CoreIndex {
        CoreIndex {
            version: SPLIT_VERSION.to_string(),
            at: String::new(),
            root: "demo".to_string(),
            tree: vec![],
            stats: IndexStats::default(),
            modules: modules
                .iter()
                .map(|(id, files)| {
                    (
                        id.to_string(),
                        ModuleEntry {
                            file_count: files.len(),
                            function_count: 0,
                            detail_path: String::new(),
                            files: files.iter().map(|f| f.to_string()).collect(),
                        },
                    )
                })
                .collect(),
            file_to_module_map: BTreeMap::new(),
            module_hashes: BTreeMap::new(),
            d_critical: BTreeMap::new(),
            d_standard: None,
            d_archive: None,
            priority_modules: vec![],
        }
    }

    #[test]
    fn test_parse_query() {
        let query = RelevanceQuery::parse("fix the Auth bug in src/auth/login.py, see utils.ts");
        assert_eq!(query.explicit_refs, vec!["src/auth/login.py", "utils.ts"]);
        assert!(query.terms.contains(&"auth".to_string()));
        assert!(query.references("web/utils.ts"));
        assert!(!query.references("web/myutils.ts"));
    }

    #[test]
    fn test_scoring_order_and_weights() {
        let now = Utc::now();
        let index = core(&[
            ("auth", &["auth/login.py", "auth/session.py"]),
            ("billing", &["billing/invoice.py"]),
            ("docs", &["docs/guide.md"]),
        ]);
        let mut changed = BTreeMap::new();
        changed.insert("billing/invoice.py".to_string(), now - Duration::days(2));
        changed.insert("auth/session.py".to_string(), now - Duration::days(20));
        changed.insert("docs/guide.md".to_string(), now - Duration::days(90));

        let query = RelevanceQuery::parse("login.py session");
        let scores = RelevanceScorer::default().at(now).score_modules(&index, &query, &changed);

        // auth: login (10 + 1) + session (2 + 1); billing: 5; docs: nothing
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].module_id, "auth");
        assert_eq!(scores[0].score, 14);
        assert_eq!(scores[1].module_id, "billing");
        assert_eq!(scores[1].score, 5);
    }

    #[test]
    fn test_ties_sorted_by_id() {
        let index = core(&[("b", &["b/api.rs"]), ("a", &["a/api.rs"])]);
        let query = RelevanceQuery::parse("api");
        let scores = RelevanceScorer::default().score_modules(&index, &query, &BTreeMap::new());
        let ids: Vec<&str> = scores.iter().map(|s| s.module_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

//! Documentation tiers and summaries
//!
//! Documentation files are not extracted like code. Each one is classified
//! into a tier by glob patterns (critical, then archive; anything else is
//! standard) and summarized as its title plus headings. Only critical docs
//! are kept in the Core Index by default.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;

use crate::models::{DocSummary, DocTier};

const DEFAULT_CRITICAL: &[&str] = &[
    "README*",
    "**/README*",
    "ARCHITECTURE*",
    "CONTRIBUTING*",
    "docs/architecture/**",
];

const DEFAULT_ARCHIVE: &[&str] = &["**/archive/**", "**/old/**", "CHANGELOG*", "HISTORY*"];

/// Headings kept per document
const MAX_HEADINGS: usize = 20;

/// Glob-based tier classifier
pub struct DocClassifier {
    critical: GlobSet,
    archive: GlobSet,
    standard: GlobSet,
}

impl DocClassifier {
    /// Build from config overrides; tiers without an override use defaults
    pub fn new(overrides: &BTreeMap<DocTier, Vec<String>>) -> Result<Self> {
        let patterns = |tier: DocTier, defaults: &[&str]| -> Vec<String> {
            overrides
                .get(&tier)
                .cloned()
                .unwrap_or_else(|| defaults.iter().map(|s| s.to_string()).collect())
        };

        Ok(Self {
            critical: build_set(&patterns(DocTier::Critical, DEFAULT_CRITICAL))?,
            archive: build_set(&patterns(DocTier::Archive, DEFAULT_ARCHIVE))?,
            standard: build_set(&patterns(DocTier::Standard, &[]))?,
        })
    }

    /// Classifier with the built-in patterns
    pub fn with_defaults() -> Self {
        Self::new(&BTreeMap::new()).unwrap_or_else(|_| Self {
            critical: GlobSet::empty(),
            archive: GlobSet::empty(),
            standard: GlobSet::empty(),
        })
    }

    /// Tier of a doc path; explicit standard patterns beat archive
    pub fn classify(&self, path: &str) -> DocTier {
        if self.critical.is_match(path) {
            DocTier::Critical
        } else if self.standard.is_match(path) {
            DocTier::Standard
        } else if self.archive.is_match(path) {
            DocTier::Archive
        } else {
            DocTier::Standard
        }
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid doc tier pattern '{}'", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build doc tier patterns")
}

/// Title (first top-level heading) and headings of a document
pub fn summarize(content: &str) -> DocSummary {
    let mut summary = DocSummary::default();
    let mut in_fence = false;
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        if trimmed.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let heading = if let Some(rest) = trimmed.strip_prefix('#') {
            let level = 1 + rest.chars().take_while(|c| *c == '#').count();
            let text = rest.trim_start_matches('#');
            if !text.starts_with(' ') && !text.is_empty() {
                continue;
            }
            Some((level, text.trim().trim_end_matches('#').trim().to_string()))
        } else {
            // Setext / reStructuredText underlines
            lines.get(idx + 1).and_then(|next| {
                let next = next.trim();
                let is_rule = next.len() >= 3 && !trimmed.trim().is_empty();
                match next.chars().next() {
                    Some('=') if is_rule && next.chars().all(|c| c == '=') => Some((1, trimmed.trim().to_string())),
                    Some('-') if is_rule && next.chars().all(|c| c == '-') => Some((2, trimmed.trim().to_string())),
                    _ => None,
                }
            })
        };

        let Some((level, text)) = heading else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        if level == 1 && summary.title.is_none() {
            summary.title = Some(text);
        } else if summary.headings.len() < MAX_HEADINGS {
            summary.headings.push(text);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let classifier = DocClassifier::with_defaults();
        assert_eq!(classifier.classify("README.md"), DocTier::Critical);
        assert_eq!(classifier.classify("docs/architecture/overview.md"), DocTier::Critical);
        assert_eq!(classifier.classify("CHANGELOG.md"), DocTier::Archive);
        assert_eq!(classifier.classify("docs/archive/2019.md"), DocTier::Archive);
        assert_eq!(classifier.classify("docs/guide.md"), DocTier::Standard);
    }

    #[test]
    fn test_override_replaces_tier_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert(DocTier::Critical, vec!["docs/adr/**".to_string()]);
        overrides.insert(DocTier::Standard, vec!["CHANGELOG*".to_string()]);
        let classifier = DocClassifier::new(&overrides).unwrap();

        assert_eq!(classifier.classify("docs/adr/0001.md"), DocTier::Critical);
        assert_eq!(classifier.classify("README.md"), DocTier::Standard);
        assert_eq!(classifier.classify("CHANGELOG.md"), DocTier::Standard);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert(DocTier::Archive, vec!["[unclosed".to_string()]);
        assert!(DocClassifier::new(&overrides).is_err());
    }

    #[test]
    fn test_summarize_markdown() {
        let doc = "# Project\n\nIntro.\n\n## Install\n\n```sh\n# not a heading\n```\n\n### Usage ###\n#hashtag\n";
        let summary = summarize(doc);
        assert_eq!(summary.title.as_deref(), Some("Project"));
        assert_eq!(summary.headings, vec!["Install", "Usage"]);
    }

    #[test]
    fn test_summarize_underlined_headings() {
        let doc = "Guide\n=====\n\nSetup\n-----\n";
        let summary = summarize(doc);
        assert_eq!(summary.title.as_deref(), Some("Guide"));
        assert_eq!(summary.headings, vec!["Setup"]);
    }
}

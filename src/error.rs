//! Typed errors for the operations whose failure kind matters to callers
//!
//! Orchestration code (builder, CLI, migration) works with `anyhow::Result`;
//! the variants here surface where a caller must branch on the failure:
//! falling back to a full build, or reporting a missing module by name.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// Change detection cannot run; the caller must do a full build
    #[error("version control unavailable: {0}")]
    VersionControlUnavailable(String),

    /// Hash mismatch, missing shard or broken partition after a write
    #[error("index integrity violation: {}", .problems.join("; "))]
    IntegrityViolation { problems: Vec<String> },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid module name '{0}' (allowed: letters, digits, '_', '-', '.')")]
    InvalidName(String),

    #[error("malformed JSON in {what}: {source}")]
    Malformed {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what} is missing required fields: {}", .fields.join(", "))]
    MissingFields { what: String, fields: Vec<String> },

    #[error("no split index found at {0}")]
    NoIndex(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors after which the only safe recovery is a full rebuild
    pub fn requires_full_rebuild(&self) -> bool {
        matches!(
            self,
            IndexError::VersionControlUnavailable(_)
                | IndexError::IntegrityViolation { .. }
                | IndexError::NoIndex(_)
                | IndexError::Malformed { .. }
                | IndexError::MissingFields { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_identifier() {
        let err = IndexError::NotFound {
            kind: "module",
            name: "src-components".to_string(),
        };
        assert_eq!(err.to_string(), "module 'src-components' not found");
        assert!(!err.requires_full_rebuild());
    }

    #[test]
    fn test_integrity_violation_lists_problems() {
        let err = IndexError::IntegrityViolation {
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "index integrity violation: a; b");
        assert!(err.requires_full_rebuild());
    }
}

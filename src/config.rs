//! Project-local configuration (`.project-index.json`)
//!
//! Every key is validated on its own: a bad value is logged, discarded and
//! replaced by its default. Configuration problems are never fatal.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use strum::{Display, EnumString};

use crate::models::DocTier;

/// Configuration file name, looked up at the project root
pub const CONFIG_FILE: &str = ".project-index.json";

/// Output layout selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Split when the project has at least `threshold` files
    Auto,
    Split,
    Single,
}

/// How large modules are refined into sub-modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SplitStrategy {
    /// Split only directories that look organized
    Auto,
    /// Split every large module, skipping the organized test
    Force,
    Disabled,
}

/// Sub-module splitting settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleConfig {
    pub enabled: bool,
    pub threshold: usize,
    pub strategy: SplitStrategy,
    /// `None` lets a detected framework preset supply the depth
    pub max_depth: Option<usize>,
}

impl SubmoduleConfig {
    pub const DEFAULT_MAX_DEPTH: usize = 3;

    /// Splitting is active unless disabled either way
    pub fn splitting_enabled(&self) -> bool {
        self.enabled && self.strategy != SplitStrategy::Disabled
    }
}

impl Default for SubmoduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100,
            strategy: SplitStrategy::Auto,
            max_depth: None,
        }
    }
}

/// Configuration for indexing behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub mode: Mode,
    /// File count at which auto mode switches to the split layout
    pub threshold: usize,
    pub submodule: SubmoduleConfig,
    /// Tier → glob patterns overriding the built-in defaults
    pub doc_tiers: BTreeMap<DocTier, Vec<String>>,
    /// Keep standard/archive doc summaries in the Core Index too
    pub include_all_doc_tiers: bool,
    /// Maximum file size to index (bytes)
    pub max_file_size: u64,
    /// Number of threads for parallel extraction (0 = auto, 80% of available cores)
    pub parallel_threads: usize,
    /// Timeout applied to every git subprocess
    pub git_timeout_secs: u64,
    /// Depth of the display tree in the Core Index
    pub tree_depth: usize,
    /// Build the Core Index only, without Detail Shards
    pub skip_details: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            threshold: 1000,
            submodule: SubmoduleConfig::default(),
            doc_tiers: BTreeMap::new(),
            include_all_doc_tiers: false,
            max_file_size: 1024 * 1024,
            parallel_threads: 0,
            git_timeout_secs: 10,
            tree_depth: 3,
            skip_details: false,
        }
    }
}

impl IndexConfig {
    /// Load `.project-index.json` from the project root, defaults if absent
    pub fn load(root: &Path) -> Self {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No {} found, using default config", CONFIG_FILE);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_json_str(&text),
            Err(e) => {
                log::warn!("Failed to read {}: {} (using defaults)", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse config text; unknown or invalid values fall back to defaults
    pub fn from_json_str(text: &str) -> Self {
        // Plain JSON first; json5 only for files with comments or trailing commas
        let parsed = serde_json::from_str::<Value>(text)
            .or_else(|_| json5::from_str::<Value>(text));
        let value = match parsed {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Malformed {}: {} (using defaults)", CONFIG_FILE, e);
                return Self::default();
            }
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(obj) = value.as_object() else {
            log::warn!("{} must contain a JSON object (using defaults)", CONFIG_FILE);
            return config;
        };

        for (key, val) in obj {
            match key.as_str() {
                "mode" => {
                    if let Some(mode) = parse_enum::<Mode>("mode", val) {
                        config.mode = mode;
                    }
                }
                "threshold" => {
                    if let Some(n) = positive_int("threshold", val) {
                        config.threshold = n as usize;
                    }
                }
                "submodule_config" => config.apply_submodule(val),
                "doc_tiers" => config.apply_doc_tiers(val),
                "include_all_doc_tiers" => match val.as_bool() {
                    Some(b) => config.include_all_doc_tiers = b,
                    None => warn_invalid("include_all_doc_tiers", val, "a boolean"),
                },
                "max_file_size" => {
                    if let Some(n) = positive_int("max_file_size", val) {
                        config.max_file_size = n;
                    }
                }
                "parallel_threads" => match val.as_u64() {
                    Some(n) => config.parallel_threads = n as usize,
                    None => warn_invalid("parallel_threads", val, "a non-negative integer"),
                },
                "git_timeout_secs" => {
                    if let Some(n) = positive_int("git_timeout_secs", val) {
                        config.git_timeout_secs = n;
                    }
                }
                "tree_depth" => {
                    if let Some(n) = positive_int("tree_depth", val) {
                        config.tree_depth = n as usize;
                    }
                }
                other => log::warn!("Unknown config key '{}' ignored", other),
            }
        }

        config
    }

    fn apply_submodule(&mut self, val: &Value) {
        let Some(obj) = val.as_object() else {
            warn_invalid("submodule_config", val, "an object");
            return;
        };

        for (key, v) in obj {
            match key.as_str() {
                "enabled" => match v.as_bool() {
                    Some(b) => self.submodule.enabled = b,
                    None => warn_invalid("submodule_config.enabled", v, "a boolean"),
                },
                "threshold" => {
                    if let Some(n) = positive_int("submodule_config.threshold", v) {
                        self.submodule.threshold = n as usize;
                    }
                }
                "strategy" => {
                    if let Some(s) = parse_enum::<SplitStrategy>("submodule_config.strategy", v) {
                        self.submodule.strategy = s;
                    }
                }
                "max_depth" => match v.as_u64() {
                    Some(n @ 1..=3) => self.submodule.max_depth = Some(n as usize),
                    _ => warn_invalid("submodule_config.max_depth", v, "an integer in 1..=3"),
                },
                other => log::warn!("Unknown config key 'submodule_config.{}' ignored", other),
            }
        }
    }

    fn apply_doc_tiers(&mut self, val: &Value) {
        let Some(obj) = val.as_object() else {
            warn_invalid("doc_tiers", val, "an object of tier -> [patterns]");
            return;
        };

        for (tier_name, patterns) in obj {
            let Ok(tier) = DocTier::from_str(tier_name) else {
                log::warn!("Unknown doc tier '{}' ignored", tier_name);
                continue;
            };
            let list: Option<Vec<String>> = patterns.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|p| p.as_str().map(str::to_string))
                    .collect()
            });
            match list {
                Some(list) => {
                    self.doc_tiers.insert(tier, list);
                }
                None => warn_invalid(&format!("doc_tiers.{}", tier_name), patterns, "a list of glob strings"),
            }
        }
    }

    /// Effective sub-module depth, honouring an optional framework hint
    pub fn effective_max_depth(&self, preset_hint: Option<usize>) -> usize {
        self.submodule
            .max_depth
            .or(preset_hint)
            .unwrap_or(SubmoduleConfig::DEFAULT_MAX_DEPTH)
    }
}

fn warn_invalid(key: &str, val: &Value, expected: &str) {
    log::warn!("Invalid config value {}={} (expected {}), using default", key, val, expected);
}

fn positive_int(key: &str, val: &Value) -> Option<u64> {
    match val.as_u64() {
        Some(n) if n > 0 => Some(n),
        _ => {
            warn_invalid(key, val, "a positive integer");
            None
        }
    }
}

fn parse_enum<T: FromStr>(key: &str, val: &Value) -> Option<T> {
    let parsed = val.as_str().and_then(|s| T::from_str(&s.to_lowercase()).ok());
    if parsed.is_none() {
        warn_invalid(key, val, "a known option");
    }
    parsed
}

//! Framework detection
//!
//! Looks at the immediate subdirectories of a `src`-like root (or the
//! repository root) and picks the preset sharing at least three directory
//! names with the layout. A preset only supplies hints: a default sub-module
//! depth and the directories worth reading first.

use std::collections::BTreeSet;

use crate::organizer::sanitize_module_id;

/// Roots searched for framework layouts, in order ("" = repository root)
const SOURCE_ROOTS: &[&str] = &["src", "app", "lib", "source", ""];

/// Matching directories needed to select a preset
const MIN_MATCHES: usize = 3;

/// A known project layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkPreset {
    pub name: &'static str,
    /// Characteristic subdirectory names
    pub markers: &'static [&'static str],
    pub max_depth: usize,
    /// Directories agents should look at first
    pub priority: &'static [&'static str],
}

pub const PRESETS: &[FrameworkPreset] = &[
    FrameworkPreset {
        name: "react",
        markers: &["components", "hooks", "pages", "contexts", "store", "styles", "assets", "utils", "services"],
        max_depth: 3,
        priority: &["components", "pages", "hooks"],
    },
    FrameworkPreset {
        name: "vue",
        markers: &["components", "views", "router", "store", "composables", "plugins", "assets"],
        max_depth: 3,
        priority: &["components", "views", "store"],
    },
    FrameworkPreset {
        name: "django",
        markers: &["models", "views", "templates", "migrations", "management", "forms", "static"],
        max_depth: 2,
        priority: &["models", "views"],
    },
    FrameworkPreset {
        name: "rails",
        markers: &["models", "controllers", "views", "helpers", "mailers", "jobs", "channels"],
        max_depth: 2,
        priority: &["models", "controllers"],
    },
    FrameworkPreset {
        name: "rust",
        markers: &["bin", "cli", "commands", "handlers", "models", "parsers", "storage", "utils"],
        max_depth: 2,
        priority: &["bin", "commands"],
    },
    FrameworkPreset {
        name: "go",
        markers: &["cmd", "internal", "pkg", "api", "configs", "scripts"],
        max_depth: 2,
        priority: &["cmd", "internal"],
    },
];

/// A preset matched against a concrete root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub preset: &'static FrameworkPreset,
    /// Root the layout was found under ("" = repository root)
    pub root: String,
    pub matched: Vec<String>,
}

impl Detection {
    /// Module ids (or id prefixes) of the preset's priority directories
    pub fn priority_module_prefixes(&self) -> Vec<String> {
        self.preset
            .priority
            .iter()
            .filter(|dir| self.matched.iter().any(|m| m == *dir))
            .map(|dir| {
                if self.root.is_empty() {
                    sanitize_module_id(dir)
                } else {
                    format!("{}-{}", sanitize_module_id(&self.root), sanitize_module_id(dir))
                }
            })
            .collect()
    }
}

/// Detect a framework layout from the indexed file list
pub fn detect(files: &[String]) -> Option<Detection> {
    for root in SOURCE_ROOTS {
        let subdirs = subdirectories(files, root);
        if subdirs.len() < MIN_MATCHES {
            continue;
        }

        let best = PRESETS
            .iter()
            .map(|preset| {
                let matched: Vec<String> = preset
                    .markers
                    .iter()
                    .filter(|m| subdirs.contains(**m))
                    .map(|m| m.to_string())
                    .collect();
                (preset, matched)
            })
            .filter(|(_, matched)| matched.len() >= MIN_MATCHES)
            // First preset wins ties
            .fold(None::<(&FrameworkPreset, Vec<String>)>, |best, candidate| match best {
                Some(b) if b.1.len() >= candidate.1.len() => Some(b),
                _ => Some(candidate),
            });

        if let Some((preset, matched)) = best {
            log::info!(
                "Detected {} layout under '{}' ({})",
                preset.name,
                if root.is_empty() { "." } else { root },
                matched.join(", ")
            );
            return Some(Detection {
                preset,
                root: root.to_string(),
                matched,
            });
        }
    }

    None
}

/// Immediate subdirectory names under `root`
fn subdirectories<'a>(files: &'a [String], root: &str) -> BTreeSet<&'a str> {
    files
        .iter()
        .filter_map(|file| {
            let rest = if root.is_empty() {
                file.as_str()
            } else {
                file.strip_prefix(root)?.strip_prefix('/')?
            };
            let (dir, _) = rest.split_once('/')?;
            Some(dir)
        })
        .collect()
}

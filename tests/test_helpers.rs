//! Test helpers: fixture projects and git plumbing

#![allow(dead_code)]

use project_index::IndexStore;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// A small multi-language project with cross-module imports
pub const SAMPLE_FILES: &[(&str, &str)] = &[
    (
        "src/auth/login.py",
        "from .session import Session\n\n\
         def login(user):\n    validate(user)\n    return Session(user)\n\n\
         def validate(user):\n    check(user)\n",
    ),
    (
        "src/auth/session.py",
        "class Session:\n    def __init__(self, user):\n        self.user = user\n",
    ),
    ("src/utils.py", "def check(value):\n    return value is not None\n"),
    (
        "tools/report.py",
        "from src.utils import check\n\ndef report():\n    check(1)\n",
    ),
    (
        "web/app.js",
        "import { render } from './render';\n\nexport function start() {\n  render();\n}\n",
    ),
    ("web/render.js", "export function render() {\n  return 1;\n}\n"),
    ("scripts/build.sh", "#!/bin/sh\n# Build everything\nbuild() {\n  echo building\n}\nbuild\n"),
    ("crates/core/src/lib.rs", "/// Entry point\npub fn run() {\n    setup();\n}\n\nfn setup() {}\n"),
    ("README.md", "# Sample\n\n## Usage\n"),
    ("CHANGELOG.md", "# Changelog\n\n## 0.1.0\n"),
    ("docs/guide.md", "# Guide\n\n## Install\n"),
];

/// Write `(relative path, content)` pairs under `root`
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
}

pub fn sample_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_files(temp.path(), SAMPLE_FILES);
    temp
}

/// Raw bytes of every shard on disk, by module id
pub fn shard_bytes(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let store = IndexStore::new(root);
    let mut shards = BTreeMap::new();
    for entry in std::fs::read_dir(store.detail_dir()).unwrap() {
        let path = entry.unwrap().path();
        let id = path.file_stem().unwrap().to_string_lossy().to_string();
        shards.insert(id, std::fs::read(&path).unwrap());
    }
    shards
}

pub fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Initialize a repository and commit everything in it
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "dev@example.com"]);
    git(dir, &["config", "user.name", "Dev"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(
        dir.join(".gitignore"),
        "PROJECT_INDEX.json\nPROJECT_INDEX.json.backup\nPROJECT_INDEX.d/\n.project-index/\n",
    )
    .unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}

/// Move the index anchor past every existing commit
///
/// Commits made in the same second as the build would otherwise be
/// reported again by `git log --since`.
pub fn advance_anchor(root: &Path) {
    let store = IndexStore::new(root);
    let mut core = store.read_core().unwrap();
    core.at = (chrono::Utc::now() + chrono::Duration::hours(1))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    store.write_core(&core).unwrap();
}

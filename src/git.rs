//! Git repository utilities
//!
//! Every query runs `git -C <root>` as a subprocess with a hard timeout: a
//! hung git is killed, and the timeout surfaces as an error like any other
//! failure. Paths are always reported relative to the indexed root.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::models::GitInfo;

const RECORD_SEP: char = '\x1e';
const FIELD_SEP: char = '\x1f';

/// Git access for one working tree
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
    timeout: Duration,
}

impl Git {
    pub fn new(root: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Check if the root is inside a git working tree
    pub fn is_repo(&self) -> bool {
        matches!(
            self.run(&["rev-parse", "--is-inside-work-tree"]),
            Ok(out) if out.trim() == "true"
        )
    }

    /// Tracked and untracked (but not ignored) files
    pub fn list_files(&self) -> Result<Vec<String>> {
        let out = self.run(&["ls-files", "--cached", "--others", "--exclude-standard"])?;
        let mut files: Vec<String> = lines(&out).collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Files touched since `since` (RFC 3339): committed, uncommitted or untracked
    pub fn changed_since(&self, since: &str) -> Result<BTreeSet<String>> {
        let since_arg = format!("--since={}", since);
        let mut changed: BTreeSet<String> = BTreeSet::new();

        let committed = self.run(&["log", "--relative", &since_arg, "--name-only", "--format="])?;
        changed.extend(lines(&committed));

        let uncommitted = self.run(&["diff", "--relative", "--name-only", "HEAD"])?;
        changed.extend(lines(&uncommitted));

        let untracked = self.run(&["ls-files", "--others", "--exclude-standard"])?;
        changed.extend(lines(&untracked));

        log::debug!("git reports {} changed files since {}", changed.len(), since);
        Ok(changed)
    }

    /// Most recent commit per file, from a single `git log` pass
    pub fn file_metadata(&self) -> Result<HashMap<String, GitInfo>> {
        let format = format!("--format={}%H{}%an{}%aI", RECORD_SEP, FIELD_SEP, FIELD_SEP);
        let out = self.run(&["log", "--relative", &format, "--name-only"])?;
        Ok(parse_log_records(&out))
    }

    /// Run git with the configured timeout and return its stdout
    fn run(&self, args: &[&str]) -> Result<String> {
        let command_line = format!("git {}", args.join(" "));

        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {}", command_line))?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().context("Failed to wait for git")? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    anyhow::bail!("{} timed out after {:?}", command_line, self.timeout);
                }
                None => thread::sleep(Duration::from_millis(5)),
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            anyhow::bail!(
                "{} failed: {}",
                command_line,
                String::from_utf8_lossy(&stderr).trim()
            );
        }

        String::from_utf8(stdout).context("Invalid UTF-8 in git output")
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn lines(out: &str) -> impl Iterator<Item = String> + '_ {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

/// Parse `RS hash FS author FS date \n files...` records; newest commit wins
fn parse_log_records(out: &str) -> HashMap<String, GitInfo> {
    let mut info: HashMap<String, GitInfo> = HashMap::new();

    for record in out.split(RECORD_SEP).filter(|r| !r.trim().is_empty()) {
        let mut record_lines = record.lines();
        let Some(header) = record_lines.next() else {
            continue;
        };
        let fields: Vec<&str> = header.split(FIELD_SEP).collect();
        let [commit, author, date] = fields.as_slice() else {
            continue;
        };

        for file in record_lines.map(str::trim).filter(|l| !l.is_empty()) {
            info.entry(file.to_string()).or_insert_with(|| GitInfo {
                commit: commit.to_string(),
                author: author.to_string(),
                date: date.to_string(),
            });
        }
    }

    info
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    pub(crate) fn git(dir: &Path, args: &[&str]) {
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

    pub(crate) fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "dev@example.com"]);
        git(dir, &["config", "user.name", "Dev"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    pub(crate) fn commit_all(dir: &Path, message: &str) {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    #[test]
    fn test_parse_log_records() {
        let out = "\x1eaaa\x1fAlice\x1f2026-02-01T10:00:00+00:00\n\nsrc/a.rs\nsrc/b.rs\n\
                   \x1ebbb\x1fBob\x1f2026-01-01T10:00:00+00:00\n\nsrc/a.rs\nREADME.md\n";
        let info = parse_log_records(out);

        assert_eq!(info.len(), 3);
        assert_eq!(info["src/a.rs"].author, "Alice");
        assert_eq!(info["README.md"].commit, "bbb");
    }

    #[test]
    fn test_not_a_repo() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let git = Git::new(temp.path(), Duration::from_secs(10));
        assert!(!git.is_repo());
        assert!(git.changed_since("2026-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_repo_queries() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        init_repo(root);
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn a() {}").unwrap();
        fs::write(root.join(".gitignore"), "target/\n").unwrap();
        commit_all(root, "initial");

        fs::write(root.join("src/new.rs"), "pub fn b() {}").unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("target/out.rs"), "").unwrap();

        let git = Git::new(root, Duration::from_secs(10));
        assert!(git.is_repo());
        assert_eq!(git.list_files().unwrap(), vec![".gitignore", "src/lib.rs", "src/new.rs"]);

        let meta = git.file_metadata().unwrap();
        assert_eq!(meta["src/lib.rs"].author, "Dev");
        assert!(!meta.contains_key("src/new.rs"));

        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        let changed = git.changed_since(&future).unwrap();
        assert!(changed.contains("src/new.rs"));
        assert!(!changed.contains("src/lib.rs"));

        fs::write(root.join("src/lib.rs"), "pub fn a() { b() }").unwrap();
        let changed = git.changed_since(&future).unwrap();
        assert!(changed.contains("src/lib.rs"));
    }
}

//! Directory tree for the Core Index
//!
//! Rendered from the indexed file list rather than the filesystem, so the
//! tree shows exactly what was indexed. Directories deeper than `max_depth`
//! are shown collapsed with their file count.

use std::collections::BTreeMap;

/// Files listed per directory before the rest are summarized
const MAX_FILES_PER_DIR: usize = 10;

#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: Vec<String>,
}

impl DirNode {
    fn insert(&mut self, path: &str) {
        match path.split_once('/') {
            Some((dir, rest)) => self.dirs.entry(dir.to_string()).or_default().insert(rest),
            None => self.files.push(path.to_string()),
        }
    }

    fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(DirNode::file_count).sum::<usize>()
    }
}

/// ASCII tree lines: directories first, then files, alphabetically
pub fn generate_tree(root_name: &str, files: &[String], max_depth: usize) -> Vec<String> {
    let mut root = DirNode::default();
    for file in files {
        root.insert(file);
    }
    sort_files(&mut root);

    let mut output = vec![format!("{}/", root_name)];
    generate_tree_recursive(&root, "", max_depth, 0, &mut output);
    output
}

fn sort_files(node: &mut DirNode) {
    node.files.sort();
    for child in node.dirs.values_mut() {
        sort_files(child);
    }
}

fn generate_tree_recursive(
    node: &DirNode,
    prefix: &str,
    max_depth: usize,
    current_depth: usize,
    output: &mut Vec<String>,
) {
    if current_depth >= max_depth {
        return;
    }

    let shown_files = node.files.len().min(MAX_FILES_PER_DIR);
    let hidden_files = node.files.len() - shown_files;
    let entry_count = node.dirs.len() + shown_files + usize::from(hidden_files > 0);
    let mut idx = 0;

    let next_connector = |idx: &mut usize| {
        *idx += 1;
        if *idx == entry_count {
            ("└──", "    ")
        } else {
            ("├──", "│   ")
        }
    };

    for (name, child) in &node.dirs {
        let (connector, extension) = next_connector(&mut idx);
        let count = child.file_count();
        let info = if count == 1 {
            "(1 file)".to_string()
        } else {
            format!("({} files)", count)
        };
        output.push(format!("{}{} {}/ {}", prefix, connector, name, info));

        if current_depth + 1 < max_depth {
            let new_prefix = format!("{}{}", prefix, extension);
            generate_tree_recursive(child, &new_prefix, max_depth, current_depth + 1, output);
        }
    }

    for name in node.files.iter().take(shown_files) {
        let (connector, _) = next_connector(&mut idx);
        output.push(format!("{}{} {}", prefix, connector, name));
    }

    if hidden_files > 0 {
        let (connector, _) = next_connector(&mut idx);
        output.push(format!("{}{} ... {} more files", prefix, connector, hidden_files));
    }
}

/// Number of distinct directories containing indexed files
pub fn count_dirs(files: &[String]) -> usize {
    let mut dirs = std::collections::BTreeSet::new();
    for file in files {
        let mut path = file.as_str();
        while let Some((parent, _)) = path.rsplit_once('/') {
            if !dirs.insert(parent.to_string()) {
                break;
            }
            path = parent;
        }
    }
    dirs.len()
}

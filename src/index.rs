//! Agent-name extraction and the bidirectional agent/file index.
//!
//! Workflow files may declare the sub-agents they install in their
//! front-section:
//!
//! ```markdown
//! ---
//! description: Review helper
//! agents:
//!   - name: reviewer
//!   - name: "fixer"
//! ---
//! ```
//!
//! An agent name must map to at most one deployed file per destination tree,
//! so the deployer keeps an index over the tree and evicts collisions before
//! writing a replacement.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static AGENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*name\s*:\s*(.+?)\s*$").unwrap());

/// Extract declared agent names from a markdown document.
///
/// Only lines inside the leading `---`-delimited front-section count; an
/// unclosed front-section extends to the end of the file, and a document
/// without one declares nothing. Matching lines look like `- name: VALUE`
/// with optional indentation; one matching pair of surrounding single or
/// double quotes is stripped from the value.
pub fn extract_agent_names(content: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    let mut lines = content.lines();
    if lines.next().map(str::trim) != Some("---") {
        return names;
    }

    for line in lines {
        if line.trim() == "---" {
            break;
        }
        if let Some(caps) = AGENT_NAME_RE.captures(line) {
            let value = strip_matching_quotes(&caps[1]);
            if !value.is_empty() {
                names.insert(value.to_string());
            }
        }
    }

    names
}

/// Strip one layer of matching single or double quotes.
fn strip_matching_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Bidirectional index of agent names over a destination tree.
///
/// The two maps are always mutual inverses and are only mutated together
/// through [`AgentIndex::insert`] and [`AgentIndex::remove`]. The index is
/// rebuilt from disk at the start of every sync run and never persisted, so
/// it can't go stale across runs.
#[derive(Debug, Default)]
pub struct AgentIndex {
    agent_to_files: HashMap<String, BTreeSet<PathBuf>>,
    file_to_agents: HashMap<PathBuf, BTreeSet<String>>,
}

impl AgentIndex {
    /// Build an index over every markdown file under `root`.
    ///
    /// A missing root yields an empty index; unreadable files are skipped
    /// with a warning rather than failing the run.
    pub fn build(root: &Path) -> Self {
        let mut index = Self::default();

        if !root.is_dir() {
            return index;
        }

        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }

            match fs::read_to_string(path) {
                Ok(content) => {
                    index.insert(path.to_path_buf(), extract_agent_names(&content));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                }
            }
        }

        index
    }

    /// Record `file` as declaring exactly `names`, replacing any previous
    /// record for the same file.
    pub fn insert(&mut self, file: PathBuf, names: BTreeSet<String>) {
        self.remove(&file);

        for name in &names {
            self.agent_to_files
                .entry(name.clone())
                .or_default()
                .insert(file.clone());
        }
        if !names.is_empty() {
            self.file_to_agents.insert(file, names);
        }
    }

    /// Drop `file` from both maps, pruning agent names left with no files.
    pub fn remove(&mut self, file: &Path) {
        let Some(names) = self.file_to_agents.remove(file) else {
            return;
        };

        for name in names {
            if let Some(files) = self.agent_to_files.get_mut(&name) {
                files.remove(file);
                if files.is_empty() {
                    self.agent_to_files.remove(&name);
                }
            }
        }
    }

    /// Files currently indexed under `name`.
    pub fn files_for(&self, name: &str) -> BTreeSet<PathBuf> {
        self.agent_to_files.get(name).cloned().unwrap_or_default()
    }

    /// Agent names currently declared by `file`.
    pub fn agents_for(&self, file: &Path) -> BTreeSet<String> {
        self.file_to_agents.get(file).cloned().unwrap_or_default()
    }

    /// Number of distinct agent names in the index.
    pub fn agent_count(&self) -> usize {
        self.agent_to_files.len()
    }
}

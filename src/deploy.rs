//! File-target synchronization for workflow and rules artifacts.
//!
//! Copies a source tree (or single file) into a destination, skipping
//! artifacts whose content already matches and evicting destination files
//! that collide with the incoming artifact on a declared agent name. One
//! failing artifact never aborts the rest of the run.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

use crate::compare;
use crate::index::{AgentIndex, extract_agent_names};

/// Options for a deployment run
#[derive(Debug, Default)]
pub struct DeployOptions {
    /// Show what would be done without making changes
    pub dry_run: bool,
    /// Show detailed output
    pub verbose: bool,
}

/// Result of one sync operation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub copied: usize,
    pub skipped: usize,
    pub removed: usize,
    pub failed: usize,
}

impl SyncOutcome {
    /// Fold another outcome into this one.
    pub fn absorb(&mut self, other: &SyncOutcome) {
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Synchronizes source artifacts into destination trees.
pub struct Deployer {
    options: DeployOptions,
}

impl Deployer {
    pub fn new(options: DeployOptions) -> Self {
        Self { options }
    }

    /// Sync every markdown file under `source` into `dest`, preserving
    /// relative paths.
    ///
    /// The agent index over `dest` is rebuilt once per call, then kept
    /// current in memory as files are replaced: this is the expensive step
    /// and is amortized across all artifacts of the run. Files whose name
    /// starts with `_` are private fragments and not deployed. An empty
    /// source tree is a successful no-op.
    pub fn sync_dir(&self, source: &Path, dest: &Path) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();

        if !self.options.dry_run {
            fs::create_dir_all(dest)
                .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
        }

        let mut index = AgentIndex::build(dest);

        for entry in WalkDir::new(source).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().is_none_or(|ext| ext != "md")
                || path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('_'))
            {
                continue;
            }

            let relative = path.strip_prefix(source).unwrap_or(path);
            let dest_path = dest.join(relative);

            match self.sync_artifact(path, &dest_path, &mut index) {
                Ok(artifact_outcome) => outcome.absorb(&artifact_outcome),
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "failed to sync artifact");
                    println!("  {} {}: {}", "✗".red(), relative.display(), e);
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Sync a single artifact with no agent indexing, e.g. a global rules
    /// file.
    pub fn sync_file(&self, source: &Path, dest: &Path) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        if compare::identical(source, dest) {
            if self.options.verbose {
                println!("  {} {}: unchanged", "⊜".dimmed(), dest.display());
            }
            outcome.skipped += 1;
            return outcome;
        }

        if self.options.dry_run {
            println!("  {} would copy to {}", "→".cyan(), dest.display());
            outcome.copied += 1;
            return outcome;
        }

        match copy_with_parents(source, dest) {
            Ok(()) => {
                println!("  {} {}", "✔".green(), dest.display());
                outcome.copied += 1;
            }
            Err(e) => {
                tracing::error!(file = %dest.display(), error = %e, "copy failed");
                println!("  {} {}: {}", "✗".red(), dest.display(), e);
                outcome.failed += 1;
            }
        }

        outcome
    }

    /// Deploy one artifact: evict agent-name collisions, then copy unless
    /// the destination is already identical. The index is updated to the
    /// new truth either way.
    fn sync_artifact(
        &self,
        source: &Path,
        dest_path: &Path,
        index: &mut AgentIndex,
    ) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();

        let content = fs::read_to_string(source)
            .with_context(|| format!("Failed to read source: {}", source.display()))?;
        let names = extract_agent_names(&content);

        for name in &names {
            for stale in index.files_for(name) {
                if same_file(&stale, dest_path) {
                    continue;
                }
                outcome.absorb(&self.evict(&stale, name, index));
            }
        }

        if compare::identical(source, dest_path) {
            if self.options.verbose {
                println!("  {} {}: unchanged", "⊜".dimmed(), dest_path.display());
            }
            outcome.skipped += 1;
        } else if self.options.dry_run {
            println!("  {} would copy to {}", "→".cyan(), dest_path.display());
            outcome.copied += 1;
        } else {
            copy_with_parents(source, dest_path)?;
            println!("  {} {}", "✔".green(), dest_path.display());
            outcome.copied += 1;
        }

        // The index must reflect the tree as it now stands, whether or not
        // a copy happened.
        if !self.options.dry_run {
            index.insert(dest_path.to_path_buf(), names);
        }

        Ok(outcome)
    }

    /// Delete a destination file that collides on an agent name. A file
    /// that already vanished is a lost race, not a failure.
    fn evict(&self, stale: &Path, agent: &str, index: &mut AgentIndex) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        if self.options.dry_run {
            println!(
                "  {} would remove {} (duplicate agent '{}')",
                "→".cyan(),
                stale.display(),
                agent
            );
            outcome.removed += 1;
            return outcome;
        }

        match fs::remove_file(stale) {
            Ok(()) => {
                println!(
                    "  {} removed {} (duplicate agent '{}')",
                    "✔".green(),
                    stale.display(),
                    agent
                );
                outcome.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                outcome.removed += 1;
            }
            Err(e) => {
                tracing::error!(file = %stale.display(), error = %e, "could not remove duplicate");
                outcome.failed += 1;
            }
        }

        // Purged unconditionally: the replacing artifact now owns the agent
        // name in this run, and a delete that failed is retried against a
        // fresh index next run.
        index.remove(stale);

        outcome
    }
}

/// Copy `source` to `dest`, creating parent directories as needed.
fn copy_with_parents(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy to {}", dest.display()))?;

    Ok(())
}

/// Path identity by resolved location, falling back to lexical equality for
/// paths that cannot be canonicalized (e.g. not yet created).
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => a == b,
    }
}

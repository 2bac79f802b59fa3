//! Sequencing of sync operations across targets.
//!
//! Each logical operation (MCP config, global rules, workflows) runs the
//! file synchronizer and/or the registry reconciler against every enabled
//! target, aggregating counts. A target that cannot be reached yields zero
//! effect and the remaining targets still run; nothing here is fatal.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::deploy::{DeployOptions, Deployer, SyncOutcome};
use crate::desired::McpDocument;
use crate::expand::expand_variables;
use crate::registry::{McpRegistry, ReconcileResult, RegistryReconciler};
use crate::targets::Ide;

/// Aggregated results of one orchestrated run
#[derive(Debug, Default)]
pub struct SyncReport {
    /// File-target counters, summed over all targets
    pub files: SyncOutcome,
    /// Registry counters
    pub registry: ReconcileResult,
    /// Targets skipped because their source input is missing
    pub targets_skipped: usize,
    /// Targets whose operation failed outright
    pub targets_failed: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.files.absorb(&other.files);
        self.registry.added += other.registry.added;
        self.registry.removed += other.registry.removed;
        self.registry.already_present += other.registry.already_present;
        self.registry.failed += other.registry.failed;
        self.targets_skipped += other.targets_skipped;
        self.targets_failed += other.targets_failed;
    }
}

/// Runs sync operations against all enabled targets.
pub struct Orchestrator {
    config: Config,
    base_dir: PathBuf,
    home: PathBuf,
    options: DeployOptions,
}

impl Orchestrator {
    /// `base_dir` anchors the configured source paths (the config file's
    /// directory, or the invocation directory without one).
    pub fn new(config: Config, base_dir: PathBuf, options: DeployOptions) -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self {
            config,
            base_dir,
            home,
            options,
        })
    }

    fn enabled_targets(&self) -> impl Iterator<Item = &'static Ide> {
        Ide::all()
            .iter()
            .filter(|ide| self.config.target_enabled(ide.id()))
    }

    fn deployer(&self) -> Deployer {
        Deployer::new(DeployOptions {
            dry_run: self.options.dry_run,
            verbose: self.options.verbose,
        })
    }

    /// Sync the MCP document: expand variables, copy the expanded text to
    /// every file-backed target, then reconcile the registry-backed target.
    ///
    /// The expanded document carries secrets, so it is staged in a
    /// temporary file that is deleted when this function returns.
    pub fn sync_mcp(&self, registry: &dyn McpRegistry) -> SyncReport {
        let mut report = SyncReport::default();

        let source = self.config.resolve(&self.base_dir, &self.config.mcp_config);
        let expanded = match self.expand_mcp_document(&source) {
            Ok(expanded) => expanded,
            Err(e) => {
                println!("{} MCP config: {}", "⚠".yellow(), e);
                report.targets_skipped += 1;
                return report;
            }
        };

        for ide in self.enabled_targets() {
            let Some(dest) = ide.mcp_config_path(&self.home) else {
                continue;
            };
            println!("\n{}", ide.name().bold());
            report.files.absorb(&self.deployer().sync_file(expanded.path(), &dest));
        }

        match self.reconcile_registry(expanded.path(), registry) {
            Ok(result) => report.registry = result,
            Err(e) => {
                tracing::error!(error = %e, "registry reconciliation failed");
                report.targets_failed += 1;
            }
        }

        report
    }

    fn expand_mcp_document(&self, source: &Path) -> Result<NamedTempFile> {
        let raw = fs::read_to_string(source)
            .with_context(|| format!("could not read {}", source.display()))?;
        let expanded = expand_variables(&raw);

        let mut staging =
            NamedTempFile::new().context("Failed to create temporary config file")?;
        staging
            .write_all(expanded.as_bytes())
            .context("Failed to write temporary config file")?;
        staging.flush().context("Failed to flush temporary config file")?;

        Ok(staging)
    }

    fn reconcile_registry(
        &self,
        expanded: &Path,
        registry: &dyn McpRegistry,
    ) -> Result<ReconcileResult> {
        let registry_targets: Vec<&Ide> = self
            .enabled_targets()
            .filter(|ide| ide.uses_registry())
            .collect();
        if registry_targets.is_empty() {
            return Ok(ReconcileResult::default());
        }

        let content = fs::read_to_string(expanded)
            .with_context(|| format!("Failed to read expanded config: {}", expanded.display()))?;
        let doc = McpDocument::parse(&content)?;

        let mut total = ReconcileResult::default();
        for ide in registry_targets {
            println!("\n{}", ide.name().bold());
            let result = RegistryReconciler::new(registry).reconcile(&doc);
            total.added += result.added;
            total.removed += result.removed;
            total.already_present += result.already_present;
            total.failed += result.failed;
        }

        Ok(total)
    }

    /// Copy the global rules file to every enabled target.
    pub fn sync_rules(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let source = self.config.resolve(&self.base_dir, &self.config.global_rules);
        if !source.is_file() {
            println!(
                "{} skipping global rules ({} not found)",
                "⚠".yellow(),
                source.display()
            );
            report.targets_skipped += 1;
            return report;
        }

        for ide in self.enabled_targets() {
            println!("\n{} global rules", ide.name().bold());
            report
                .files
                .absorb(&self.deployer().sync_file(&source, &ide.rules_path(&self.home)));
        }

        report
    }

    /// Deploy the workflow tree to every enabled target.
    pub fn sync_workflows(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let source = self.config.resolve(&self.base_dir, &self.config.workflows_dir);
        if !source.is_dir() {
            println!(
                "{} skipping workflows ({} not found)",
                "⚠".yellow(),
                source.display()
            );
            report.targets_skipped += 1;
            return report;
        }

        for ide in self.enabled_targets() {
            println!("\n{} workflows", ide.name().bold());
            match self.deployer().sync_dir(&source, &ide.workflows_dir(&self.home)) {
                Ok(outcome) => report.files.absorb(&outcome),
                Err(e) => {
                    tracing::error!(ide = ide.id(), error = %e, "workflow sync failed");
                    println!("  {} {}", "✗".red(), e);
                    report.targets_failed += 1;
                }
            }
        }

        report
    }

    /// Run all three operations in sequence.
    pub fn sync_all(&self, registry: &dyn McpRegistry) -> SyncReport {
        let mut report = self.sync_mcp(registry);
        report.merge(self.sync_rules());
        report.merge(self.sync_workflows());
        report
    }

    /// Remove every deployed workflow file from the enabled targets.
    pub fn clean_workflows(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for ide in self.enabled_targets() {
            let dir = ide.workflows_dir(&self.home);
            if !dir.is_dir() {
                continue;
            }
            println!("\n{} workflows", ide.name().bold());

            for entry in walkdir::WalkDir::new(&dir)
                .into_iter()
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if !entry.file_type().is_file() || path.extension().is_none_or(|e| e != "md") {
                    continue;
                }

                if self.options.dry_run {
                    println!("  {} would remove {}", "→".cyan(), path.display());
                    report.files.removed += 1;
                } else {
                    match fs::remove_file(path) {
                        Ok(()) => {
                            println!("  {} removed {}", "✔".green(), path.display());
                            report.files.removed += 1;
                        }
                        Err(e) => {
                            println!("  {} {}: {}", "✗".red(), path.display(), e);
                            report.files.failed += 1;
                        }
                    }
                }
            }
        }

        report
    }

    /// Print per-target deployment status.
    pub fn status(&self) {
        for ide in self.enabled_targets() {
            println!("\n{}", ide.name().bold());

            let workflows = ide.workflows_dir(&self.home);
            if workflows.is_dir() {
                let count = walkdir::WalkDir::new(&workflows)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| {
                        e.file_type().is_file()
                            && e.path().extension().is_some_and(|ext| ext == "md")
                    })
                    .count();
                println!(
                    "  {} workflows: {} ({} files)",
                    "✔".green(),
                    workflows.display(),
                    count
                );
            } else {
                println!("  {} workflows: {} (not created)", "○".yellow(), workflows.display());
            }

            let rules = ide.rules_path(&self.home);
            if rules.is_file() {
                println!("  {} rules: {}", "✔".green(), rules.display());
            } else {
                println!("  {} rules: {} (not created)", "○".yellow(), rules.display());
            }

            if let Some(mcp) = ide.mcp_config_path(&self.home) {
                if mcp.is_file() {
                    println!("  {} mcp config: {}", "✔".green(), mcp.display());
                } else {
                    println!("  {} mcp config: {} (not created)", "○".yellow(), mcp.display());
                }
            } else if ide.uses_registry() {
                println!("  {} mcp servers: managed via registry CLI", "·".dimmed());
            }
        }
    }
}

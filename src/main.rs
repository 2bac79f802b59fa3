//! McpSync CLI
//!
//! Command-line interface for synchronizing MCP servers, workflow agents,
//! and global rules across AI IDEs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mcpsync::config::TargetConfig;
use mcpsync::{ClaudeCliRegistry, Config, DeployOptions, Ide, Orchestrator, SyncReport};

#[derive(Parser)]
#[command(name = "mcpsync")]
#[command(
    author,
    version,
    about = "Sync MCP servers, workflow agents, and global rules across AI IDEs"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory to search for mcpsync.toml (default: current directory)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Restrict to a single target IDE
    #[arg(short, long, global = true)]
    ide: Option<String>,

    /// Show detailed output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync everything: MCP config, global rules, and workflows
    Sync {
        /// Show what would be done without making changes (file targets)
        #[arg(long)]
        dry_run: bool,
    },

    /// Sync MCP servers to editor configs and the Claude CLI registry
    Mcp,

    /// Deploy workflow agents to the IDE workflow directories
    Workflows {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy the global rules file to every IDE
    Rules {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Show per-IDE deployment status
    Status,

    /// Remove deployed workflow files from the IDE directories
    Clean {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let start_dir = cli
        .path
        .clone()
        .unwrap_or_else(|| env::current_dir().unwrap());

    // Locate and load the tool config; absence means defaults.
    let config_path = cli.config.clone().or_else(|| Config::find_config(&start_dir));
    let (mut config, base_dir) = match config_path {
        Some(path) => {
            if cli.verbose {
                println!("Using config: {}\n", path.display().to_string().dimmed());
            }
            let base = path.parent().map(PathBuf::from).unwrap_or_else(|| start_dir.clone());
            (Config::load(&path)?, base)
        }
        None => (Config::default(), start_dir),
    };

    if let Some(filter) = &cli.ide {
        restrict_to_ide(&mut config, filter)?;
    }

    print_header();

    let dry_run = match &cli.command {
        Commands::Sync { dry_run }
        | Commands::Workflows { dry_run }
        | Commands::Rules { dry_run }
        | Commands::Clean { dry_run } => *dry_run,
        _ => false,
    };
    if dry_run {
        println!("{}", "Running in dry-run mode\n".cyan());
    }

    let options = DeployOptions {
        dry_run,
        verbose: cli.verbose,
    };
    let orchestrator = Orchestrator::new(config, base_dir, options)?;
    let registry = ClaudeCliRegistry::new();

    let report = match cli.command {
        Commands::Sync { .. } => orchestrator.sync_all(&registry),
        Commands::Mcp => orchestrator.sync_mcp(&registry),
        Commands::Workflows { .. } => orchestrator.sync_workflows(),
        Commands::Rules { .. } => orchestrator.sync_rules(),
        Commands::Status => {
            orchestrator.status();
            return Ok(());
        }
        Commands::Clean { .. } => {
            let report = orchestrator.clean_workflows();
            println!("\n{}", "✨ Clean complete!".green().bold());
            println!("  Removed: {} files", report.files.removed.to_string().green());
            return Ok(());
        }
    };

    print_summary(&report);
    Ok(())
}

/// Keep only the named IDE enabled; everything else is switched off.
fn restrict_to_ide(config: &mut Config, filter: &str) -> Result<()> {
    let selected = Ide::from_id(filter)
        .ok_or_else(|| anyhow::anyhow!("Unknown target IDE: {filter}"))?;

    for ide in Ide::all() {
        config.targets.insert(
            ide.id().to_string(),
            TargetConfig {
                enabled: *ide == selected,
            },
        );
    }

    Ok(())
}

fn print_summary(report: &SyncReport) {
    println!("\n{}", "✨ Sync complete!".green().bold());
    println!(
        "  Files    Copied: {}, Skipped: {}, Removed: {}, Failed: {}",
        report.files.copied.to_string().green(),
        report.files.skipped.to_string().dimmed(),
        report.files.removed.to_string().yellow(),
        paint_count(report.files.failed)
    );
    println!(
        "  Registry Added: {}, Removed: {}, Present: {}, Failed: {}",
        report.registry.added.to_string().green(),
        report.registry.removed.to_string().yellow(),
        report.registry.already_present.to_string().dimmed(),
        paint_count(report.registry.failed)
    );
    if report.targets_skipped > 0 {
        println!(
            "  Skipped {} operation(s) with missing sources",
            report.targets_skipped.to_string().yellow()
        );
    }
}

fn paint_count(failed: usize) -> colored::ColoredString {
    if failed > 0 {
        failed.to_string().red()
    } else {
        failed.to_string().dimmed()
    }
}

fn print_header() {
    println!(
        "{}",
        r#"
╔═══════════════════════════════════════════════════════════════════╗
║                          McpSync                                  ║
║        MCP & Workflow Configuration Synchronization               ║
╚═══════════════════════════════════════════════════════════════════╝
"#
        .cyan()
        .bold()
    );
}

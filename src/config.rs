//! Configuration parsing for mcpsync.
//!
//! Two documents meet here: the tool's own TOML configuration (where the
//! desired-state inputs live, which IDE targets are enabled) and the typed
//! shape of a single MCP server entry from the desired-state JSON document.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "mcpsync.toml";

/// Default desired-state document name
pub const DEFAULT_MCP_CONFIG: &str = "mcp_config.json";

/// Default workflow source directory name
pub const DEFAULT_WORKFLOWS_DIR: &str = "workflows";

/// Default global rules file name
pub const DEFAULT_GLOBAL_RULES: &str = "global_rules.md";

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Desired-state MCP document (relative to the config file)
    #[serde(default = "default_mcp_config")]
    pub mcp_config: String,

    /// Workflow source directory (relative to the config file)
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,

    /// Global rules file (relative to the config file)
    #[serde(default = "default_global_rules")]
    pub global_rules: String,

    /// Per-target overrides, keyed by target id
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mcp_config: default_mcp_config(),
            workflows_dir: default_workflows_dir(),
            global_rules: default_global_rules(),
            targets: HashMap::new(),
        }
    }
}

fn default_mcp_config() -> String {
    DEFAULT_MCP_CONFIG.to_string()
}

fn default_workflows_dir() -> String {
    DEFAULT_WORKFLOWS_DIR.to_string()
}

fn default_global_rules() -> String {
    DEFAULT_GLOBAL_RULES.to_string()
}

/// Configuration for a single IDE target
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Whether this target receives synced artifacts
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Find a configuration file by searching up from the start directory.
    /// A missing config is not an error; all defaults apply.
    pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Whether the target with the given id is enabled.
    pub fn target_enabled(&self, id: &str) -> bool {
        self.targets.get(id).is_none_or(|t| t.enabled)
    }

    /// Resolve a configured path against the directory holding the config
    /// file (or the start directory when no config file exists).
    pub fn resolve(&self, base_dir: &Path, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

// =============================================================================
// Desired MCP server entries
// =============================================================================

/// One desired MCP server entry from the desired-state document.
///
/// Either `command` or `url` must be present for the entry to be
/// registrable; that is validated at reconcile time so one bad entry never
/// sinks the batch. Unknown fields in the source document are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerConfig {
    /// Executable for command-based servers
    pub command: Option<String>,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Endpoint for HTTP-transport servers; the document may spell the key
    /// `url` or `serverUrl`
    #[serde(default, alias = "serverUrl")]
    pub url: Option<String>,

    /// HTTP headers, as a mapping or as preformatted `"Key: Value"` strings
    #[serde(default)]
    pub headers: Headers,

    /// Excluded from every sync when true
    #[serde(default)]
    pub disabled: bool,
}

/// Header sets appear in two shapes in the wild: a mapping, or a flat list
/// of already-formatted header strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Headers {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

impl Default for Headers {
    fn default() -> Self {
        Headers::Map(BTreeMap::new())
    }
}

impl Headers {
    pub fn is_empty(&self) -> bool {
        match self {
            Headers::Map(map) => map.is_empty(),
            Headers::List(list) => list.is_empty(),
        }
    }

    /// Flatten to `"Key: Value"` strings, one per header. The map form
    /// follows key order so repeated runs emit identical argument vectors.
    pub fn as_pairs(&self) -> Vec<String> {
        match self {
            Headers::Map(map) => map.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
            Headers::List(list) => list.clone(),
        }
    }
}

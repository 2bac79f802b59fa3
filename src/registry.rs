//! Reconciliation against the CLI-managed MCP registry.
//!
//! Claude Code keeps its MCP servers in a registry that is only reachable
//! through the `claude mcp` subcommands, so this module models that boundary
//! as a small capability trait (`list`/`add`/`remove`) with a subprocess
//! implementation. The reconciler itself only speaks the trait, which keeps
//! the diff/classify logic testable against an in-memory fake.

use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::process::Command;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::config::McpServerConfig;
use crate::desired::McpDocument;

/// Marker token for command entries that merely bridge to a remote HTTP
/// server (e.g. `npx -y mcp-remote https://...`); such entries are
/// registered over the direct transport instead.
const REMOTE_BRIDGE_MARKER: &str = "mcp-remote";

/// Auto-confirm flag dropped from forwarded argument lists; the registry
/// invocation already runs non-interactively.
const AUTO_CONFIRM_FLAG: &str = "-y";

/// Errors at the registry subprocess boundary.
///
/// Stderr is preserved verbatim: classification ("already exists") and
/// diagnostics both depend on the external tool's own words.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("server '{name}' declares neither 'command' nor 'serverUrl'")]
    InvalidEntry { name: String },
}

impl RegistryError {
    /// The external tool's captured stderr, when there is one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RegistryError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Whether the failure is the registry refusing a duplicate, which the
    /// reconciler treats as success-equivalent.
    pub fn is_already_registered(&self) -> bool {
        self.stderr().is_some_and(|s| s.contains("already exists"))
    }
}

// =============================================================================
// Registry Capability
// =============================================================================

/// The three operations the reconciler needs from an MCP registry.
pub trait McpRegistry {
    /// Names of all currently registered servers.
    fn list(&self) -> Result<Vec<String>, RegistryError>;

    /// Register a server under `name`.
    fn add(&self, name: &str, server: &McpServerConfig) -> Result<(), RegistryError>;

    /// Unregister the server called `name`.
    fn remove(&self, name: &str) -> Result<(), RegistryError>;
}

// =============================================================================
// Claude CLI implementation
// =============================================================================

/// Registry backed by the `claude mcp` subcommands.
pub struct ClaudeCliRegistry {
    binary: String,
}

impl ClaudeCliRegistry {
    pub fn new() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }

    /// Use a different executable, e.g. a stub in tests.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String, RegistryError> {
        let command = format!("{} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| RegistryError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(RegistryError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for ClaudeCliRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl McpRegistry for ClaudeCliRegistry {
    /// List registered names, preferring the machine-readable listing and
    /// falling back to parsing the human-oriented text output.
    fn list(&self) -> Result<Vec<String>, RegistryError> {
        if let Ok(stdout) = self.run(&args(&["mcp", "list", "--json"]))
            && let Some(names) = parse_list_json(&stdout)
            && !names.is_empty()
        {
            return Ok(names);
        }

        let stdout = self.run(&args(&["mcp", "list"]))?;
        Ok(parse_list_text(&stdout))
    }

    fn add(&self, name: &str, server: &McpServerConfig) -> Result<(), RegistryError> {
        let invocation = add_invocation(name, server)?;
        self.run(&invocation).map(|_| ())
    }

    /// Removal tries the scoped form first and falls back to the unscoped
    /// form; the error reported on total failure is the unscoped one.
    fn remove(&self, name: &str) -> Result<(), RegistryError> {
        match self.run(&args(&["mcp", "remove", "--scope", "user", name])) {
            Ok(_) => Ok(()),
            Err(scoped_err) => {
                tracing::debug!(server = name, error = %scoped_err, "scoped remove failed, retrying unscoped");
                self.run(&args(&["mcp", "remove", name])).map(|_| ())
            }
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Listing parsers
// =============================================================================

/// Parse the `--json` listing. Both observed shapes are accepted: a bare
/// array of server objects, and an object with a `servers` array. Returns
/// `None` when the output is not parseable JSON.
fn parse_list_json(stdout: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(stdout).ok()?;

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => obj.get("servers")?.as_array()?.as_slice(),
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
    )
}

static LIST_NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Parse the plain-text listing, where each server's name is the token
/// before the first colon:
///
/// ```text
/// playwright: npx @playwright/mcp@latest - ✓ Connected
/// ```
///
/// This is the degraded-confidence path: the accepted character set for
/// names is deliberately restrictive so stray log lines don't turn into
/// phantom servers.
fn parse_list_text(stdout: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = BTreeSet::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.to_lowercase().starts_with("checking mcp server health") {
            continue;
        }
        let Some((candidate, _)) = line.split_once(':') else {
            continue;
        };
        let candidate = candidate.trim();
        if LIST_NAME_RE.is_match(candidate) && seen.insert(candidate.to_string()) {
            names.push(candidate.to_string());
        }
    }

    names
}

// =============================================================================
// Add-command translation
// =============================================================================

/// Translate a desired entry into the registry's add arguments (everything
/// after the binary name).
///
/// HTTP entries become `--transport http` adds with one `--header` flag per
/// header. Command entries keep their command and args verbatim behind an
/// explicit `--` separator, so argument values that look like flags are
/// never swallowed by the registry CLI; the conventional `-y` auto-confirm
/// token is dropped.
pub fn add_invocation(name: &str, server: &McpServerConfig) -> Result<Vec<String>, RegistryError> {
    let mut invocation = args(&["mcp", "add", "--scope", "user"]);

    if let Some(endpoint) = http_endpoint(server) {
        invocation.extend(args(&["--transport", "http", name, &endpoint]));
        for header in server.headers.as_pairs() {
            invocation.push("--header".to_string());
            invocation.push(header);
        }
        return Ok(invocation);
    }

    let Some(command) = &server.command else {
        return Err(RegistryError::InvalidEntry {
            name: name.to_string(),
        });
    };

    invocation.push(name.to_string());
    invocation.push("--".to_string());
    invocation.push(command.clone());
    invocation.extend(
        server
            .args
            .iter()
            .filter(|arg| arg.as_str() != AUTO_CONFIRM_FLAG)
            .cloned(),
    );

    Ok(invocation)
}

/// The HTTP endpoint this entry should be registered against, if any:
/// either an explicit URL field, or the URL argument of a recognizable
/// remote-bridge command.
fn http_endpoint(server: &McpServerConfig) -> Option<String> {
    if let Some(url) = &server.url {
        return Some(url.clone());
    }

    if server.args.iter().any(|arg| arg == REMOTE_BRIDGE_MARKER) {
        return server.args.iter().find(|arg| is_http_url(arg)).cloned();
    }

    None
}

fn is_http_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

// =============================================================================
// Reconciler
// =============================================================================

/// Result of one registry reconciliation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub added: usize,
    pub removed: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Diffs the desired document against the observed registry state and
/// applies the difference.
pub struct RegistryReconciler<'a> {
    registry: &'a dyn McpRegistry,
}

impl<'a> RegistryReconciler<'a> {
    pub fn new(registry: &'a dyn McpRegistry) -> Self {
        Self { registry }
    }

    /// Observe, prune obsolete entries, then add missing ones.
    ///
    /// When the observed name set already equals the desired one, no
    /// mutation is attempted at all; repeated runs against an unchanged
    /// document are no-ops. A failed observation is treated as an empty
    /// registry: the cost of re-adding is redundant work the registry
    /// rejects as duplicates, while skipping adds could silently lose
    /// entries.
    pub fn reconcile(&self, doc: &McpDocument) -> ReconcileResult {
        let mut result = ReconcileResult::default();

        for (name, error) in &doc.invalid {
            println!("  {} {}: {}", "✗".red(), name, error);
            result.failed += 1;
        }

        let desired: BTreeSet<&str> = doc.enabled_names().into_iter().collect();

        let observed: BTreeSet<String> = match self.registry.list() {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list registry, treating as empty");
                BTreeSet::new()
            }
        };
        let observed: BTreeSet<&str> = observed.iter().map(String::as_str).collect();

        if observed == desired {
            if !desired.is_empty() {
                println!(
                    "  {} {} servers already registered",
                    "⊜".dimmed(),
                    desired.len()
                );
            }
            result.already_present += desired.len();
            return result;
        }

        for name in observed.difference(&desired) {
            match self.registry.remove(name) {
                Ok(()) => {
                    println!("  {} removed: {}", "✔".green(), name);
                    result.removed += 1;
                }
                Err(e) => {
                    println!("  {} could not remove {}: {}", "✗".red(), name, e);
                    result.failed += 1;
                }
            }
        }

        for (name, server) in doc.enabled_entries() {
            if server.url.is_none() && server.command.is_none() {
                println!(
                    "  {} {}: declares neither 'command' nor 'serverUrl'",
                    "✗".red(),
                    name
                );
                result.failed += 1;
                continue;
            }

            match self.registry.add(name, server) {
                Ok(()) => {
                    println!("  {} added: {}", "✔".green(), name);
                    result.added += 1;
                }
                Err(e) if e.is_already_registered() => {
                    println!("  {} already registered: {}", "⊜".dimmed(), name);
                    result.already_present += 1;
                }
                Err(e) => {
                    println!("  {} failed to add {}: {}", "✗".red(), name, e);
                    tracing::error!(server = name.as_str(), error = %e, "registry add failed");
                    result.failed += 1;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Headers;
    use std::collections::BTreeMap;

    fn command_server(command: &str, args: &[&str]) -> McpServerConfig {
        McpServerConfig {
            command: Some(command.to_string()),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_invocation_command_entry() {
        let server = command_server("npx", &["-y", "@playwright/mcp@latest"]);
        let invocation = add_invocation("playwright", &server).unwrap();

        assert_eq!(
            invocation,
            vec![
                "mcp",
                "add",
                "--scope",
                "user",
                "playwright",
                "--",
                "npx",
                "@playwright/mcp@latest"
            ]
        );
    }

    #[test]
    fn test_add_invocation_keeps_flag_like_args_behind_separator() {
        let server = command_server("uvx", &["server", "--port", "8080"]);
        let invocation = add_invocation("local", &server).unwrap();

        let separator = invocation.iter().position(|a| a == "--").unwrap();
        assert!(invocation.iter().position(|a| a == "--port").unwrap() > separator);
    }

    #[test]
    fn test_add_invocation_http_entry_with_headers() {
        let server = McpServerConfig {
            url: Some("https://mcp.context7.com/mcp".to_string()),
            headers: Headers::Map(BTreeMap::from([(
                "Authorization".to_string(),
                "Bearer token".to_string(),
            )])),
            ..Default::default()
        };

        let invocation = add_invocation("context7", &server).unwrap();
        assert_eq!(
            invocation,
            vec![
                "mcp",
                "add",
                "--scope",
                "user",
                "--transport",
                "http",
                "context7",
                "https://mcp.context7.com/mcp",
                "--header",
                "Authorization: Bearer token"
            ]
        );
    }

    #[test]
    fn test_add_invocation_preformatted_header_list() {
        let server = McpServerConfig {
            url: Some("https://x.example/mcp".to_string()),
            headers: Headers::List(vec!["X-Key: abc".to_string()]),
            ..Default::default()
        };

        let invocation = add_invocation("x", &server).unwrap();
        assert!(invocation.windows(2).any(|w| w == ["--header", "X-Key: abc"]));
    }

    #[test]
    fn test_add_invocation_rewrites_remote_bridge() {
        let server = command_server("npx", &["-y", "mcp-remote", "https://bridge.example/mcp"]);
        let invocation = add_invocation("bridged", &server).unwrap();

        assert!(invocation.windows(2).any(|w| w == ["--transport", "http"]));
        assert!(invocation.contains(&"https://bridge.example/mcp".to_string()));
        assert!(!invocation.contains(&"npx".to_string()));
    }

    #[test]
    fn test_add_invocation_plain_command_not_rewritten() {
        // A URL argument without the bridge marker stays a command entry.
        let server = command_server("docs-server", &["--endpoint", "https://docs.example"]);
        let invocation = add_invocation("docs", &server).unwrap();
        assert!(!invocation.windows(2).any(|w| w == ["--transport", "http"]));
    }

    #[test]
    fn test_add_invocation_filters_auto_confirm_flag() {
        let server = command_server("npx", &["-y", "pkg", "arg"]);
        let invocation = add_invocation("s", &server).unwrap();
        assert!(!invocation.contains(&"-y".to_string()));
        assert!(invocation.contains(&"arg".to_string()));
    }

    #[test]
    fn test_add_invocation_missing_command_and_url() {
        let server = McpServerConfig::default();
        let err = add_invocation("broken", &server).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEntry { .. }));
    }

    #[test]
    fn test_parse_list_json_shapes() {
        let names =
            parse_list_json(r#"[{"name": "a"}, {"name": "b"}]"#).unwrap();
        assert_eq!(names, vec!["a", "b"]);

        let names =
            parse_list_json(r#"{"servers": [{"name": "only"}]}"#).unwrap();
        assert_eq!(names, vec!["only"]);

        assert!(parse_list_json("not json").is_none());
    }

    #[test]
    fn test_parse_list_text_extracts_names() {
        let output = "Checking MCP server health...\n\n\
                      playwright: npx @playwright/mcp@latest - ✓ Connected\n\
                      context7: https://mcp.context7.com/mcp (HTTP) - ✓ Connected\n";
        assert_eq!(parse_list_text(output), vec!["playwright", "context7"]);
    }

    #[test]
    fn test_parse_list_text_rejects_unsafe_names() {
        let output = "some log line: with a colon\nok-name_1.x: cmd\n";
        // "some log line" contains spaces and fails the identifier check.
        assert_eq!(parse_list_text(output), vec!["ok-name_1.x"]);
    }

    #[test]
    fn test_already_registered_classification() {
        let err = RegistryError::CommandFailed {
            command: "claude mcp add x".to_string(),
            stderr: "MCP server x already exists in user config".to_string(),
        };
        assert!(err.is_already_registered());

        let err = RegistryError::CommandFailed {
            command: "claude mcp add x".to_string(),
            stderr: "connection refused".to_string(),
        };
        assert!(!err.is_already_registered());
    }
}

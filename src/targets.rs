//! IDE target definitions.
//!
//! Each supported IDE consumes synced artifacts at fixed locations under the
//! user's home directory. Claude Code is special: its MCP servers live in a
//! CLI-managed registry rather than a config file, so it has no MCP file
//! path and is instead reconciled through the `claude mcp` subprocess
//! boundary.

use std::path::{Path, PathBuf};

/// Known sync targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ide {
    /// Antigravity (Google Gemini Code)
    Antigravity,
    /// Cursor
    Cursor,
    /// Windsurf (Codeium)
    Windsurf,
    /// Claude Code
    ClaudeCode,
}

impl Ide {
    /// Get all supported targets
    pub fn all() -> &'static [Ide] {
        &[Ide::Antigravity, Ide::Cursor, Ide::Windsurf, Ide::ClaudeCode]
    }

    /// Get the target identifier string (used in config)
    pub fn id(&self) -> &'static str {
        match self {
            Ide::Antigravity => "antigravity",
            Ide::Cursor => "cursor",
            Ide::Windsurf => "windsurf",
            Ide::ClaudeCode => "claude",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Ide::Antigravity => "Antigravity",
            Ide::Cursor => "Cursor",
            Ide::Windsurf => "Windsurf",
            Ide::ClaudeCode => "Claude Code",
        }
    }

    /// Directory receiving deployed workflow files
    pub fn workflows_dir(&self, home: &Path) -> PathBuf {
        match self {
            Ide::Antigravity => home.join(".gemini/antigravity/global_workflows"),
            Ide::Cursor => home.join(".cursor/rules"),
            Ide::Windsurf => home.join(".codeium/windsurf/global_workflows"),
            Ide::ClaudeCode => home.join(".claude/agents"),
        }
    }

    /// Destination of the global rules file
    pub fn rules_path(&self, home: &Path) -> PathBuf {
        match self {
            Ide::Antigravity => home.join(".gemini/GEMINI.md"),
            Ide::Cursor => home.join(".cursor/AGENTS.md"),
            Ide::Windsurf => home.join(".codeium/windsurf/memories/global_rules.md"),
            Ide::ClaudeCode => home.join(".claude/CLAUDE.md"),
        }
    }

    /// MCP config file path, for file-backed targets only
    pub fn mcp_config_path(&self, home: &Path) -> Option<PathBuf> {
        match self {
            Ide::Antigravity => None,
            Ide::Cursor => Some(home.join(".cursor/mcp.json")),
            Ide::Windsurf => Some(home.join(".codeium/windsurf/mcp_config.json")),
            Ide::ClaudeCode => None,
        }
    }

    /// Whether MCP servers for this target live in a CLI-managed registry
    pub fn uses_registry(&self) -> bool {
        matches!(self, Ide::ClaudeCode)
    }

    /// Parse a target from a string identifier
    pub fn from_id(id: &str) -> Option<Ide> {
        if id.eq_ignore_ascii_case("antigravity") || id.eq_ignore_ascii_case("gemini") {
            Some(Ide::Antigravity)
        } else if id.eq_ignore_ascii_case("cursor") {
            Some(Ide::Cursor)
        } else if id.eq_ignore_ascii_case("windsurf") || id.eq_ignore_ascii_case("codeium") {
            Some(Ide::Windsurf)
        } else if id.eq_ignore_ascii_case("claude")
            || id.eq_ignore_ascii_case("claude-code")
            || id.eq_ignore_ascii_case("claude_code")
        {
            Some(Ide::ClaudeCode)
        } else {
            None
        }
    }
}

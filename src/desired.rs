//! Desired-state document parsing.
//!
//! The source of truth is a JSON document with a top-level `mcpServers`
//! mapping of server name to entry body. Entries are kept in document order
//! so repeated reconciliations replay the same operation sequence, and a
//! single malformed entry is collected rather than aborting the batch.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::config::McpServerConfig;

/// Parsed desired-state document.
///
/// Duplicate server names collapse to the last occurrence (mapping overwrite
/// semantics during JSON parsing); callers that need duplicates rejected
/// must lint the document upstream.
#[derive(Debug, Default)]
pub struct McpDocument {
    /// Well-formed entries in document order
    pub entries: Vec<(String, McpServerConfig)>,

    /// Entries that failed to deserialize: (name, error text)
    pub invalid: Vec<(String, String)>,
}

impl McpDocument {
    /// Parse a desired-state document, already variable-expanded.
    pub fn parse(content: &str) -> Result<Self> {
        let root: Value =
            serde_json::from_str(content).context("Failed to parse MCP config as JSON")?;

        let Some(servers) = root.get("mcpServers") else {
            bail!("MCP config has no 'mcpServers' key");
        };
        let Some(servers) = servers.as_object() else {
            bail!("'mcpServers' must be an object of name -> server entry");
        };

        let mut doc = McpDocument::default();
        for (name, body) in servers {
            match serde_json::from_value::<McpServerConfig>(body.clone()) {
                Ok(entry) => doc.entries.push((name.clone(), entry)),
                Err(e) => doc.invalid.push((name.clone(), e.to_string())),
            }
        }

        Ok(doc)
    }

    /// Names of entries that should exist in a target, excluding disabled
    /// ones, in document order.
    pub fn enabled_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.disabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Enabled entries in document order.
    pub fn enabled_entries(&self) -> impl Iterator<Item = &(String, McpServerConfig)> {
        self.entries.iter().filter(|(_, entry)| !entry.disabled)
    }
}

//! Environment variable expansion for the desired-state document.
//!
//! The committed `mcp_config.json` references secrets as `${VAR}` so tokens
//! never live in the repository; expansion happens in memory right before
//! syncing.

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Replace every `${VAR}` reference with the value from the process
/// environment. Unset variables are left as the literal reference and logged,
/// so a broken shell profile shows up in the synced output instead of as an
/// empty string.
pub fn expand_variables(content: &str) -> String {
    VAR_RE
        .replace_all(content, |caps: &regex::Captures| {
            let name = &caps[1];
            match env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(variable = name, "environment variable is not set");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

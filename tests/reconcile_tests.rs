//! Registry reconciliation against an in-memory fake of the registry
//! capability, so the diff/classify logic is exercised without spawning the
//! external CLI.

use std::cell::RefCell;
use std::collections::BTreeSet;

use mcpsync::desired::McpDocument;
use mcpsync::registry::{McpRegistry, RegistryError, RegistryReconciler};

/// In-memory registry with scriptable failures and an operation log.
#[derive(Default)]
struct FakeRegistry {
    servers: RefCell<BTreeSet<String>>,
    ops: RefCell<Vec<String>>,
    list_fails: bool,
    remove_fails_for: BTreeSet<String>,
}

impl FakeRegistry {
    fn with_servers(names: &[&str]) -> Self {
        Self {
            servers: RefCell::new(names.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.borrow().clone()
    }

    fn mutation_ops(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter(|op| !op.starts_with("list"))
            .collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.servers.borrow().contains(name)
    }
}

impl McpRegistry for FakeRegistry {
    fn list(&self) -> Result<Vec<String>, RegistryError> {
        self.ops.borrow_mut().push("list".to_string());
        if self.list_fails {
            return Err(RegistryError::CommandFailed {
                command: "claude mcp list".to_string(),
                stderr: "registry unavailable".to_string(),
            });
        }
        Ok(self.servers.borrow().iter().cloned().collect())
    }

    fn add(
        &self,
        name: &str,
        _server: &mcpsync::McpServerConfig,
    ) -> Result<(), RegistryError> {
        self.ops.borrow_mut().push(format!("add {name}"));
        if !self.servers.borrow_mut().insert(name.to_string()) {
            return Err(RegistryError::CommandFailed {
                command: format!("claude mcp add {name}"),
                stderr: format!("MCP server {name} already exists in user config"),
            });
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.ops.borrow_mut().push(format!("remove {name}"));
        if self.remove_fails_for.contains(name) {
            return Err(RegistryError::CommandFailed {
                command: format!("claude mcp remove {name}"),
                stderr: "permission denied".to_string(),
            });
        }
        self.servers.borrow_mut().remove(name);
        Ok(())
    }
}

fn doc(json: &str) -> McpDocument {
    McpDocument::parse(json).unwrap()
}

#[test]
fn adds_missing_entry_to_empty_registry() {
    // Desired {A}, observed {} -> add A, remove nothing.
    let registry = FakeRegistry::default();
    let document = doc(r#"{"mcpServers": {"alpha": {"command": "x"}}}"#);

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.added, 1);
    assert_eq!(result.removed, 0);
    assert_eq!(result.failed, 0);
    assert!(registry.contains("alpha"));
}

#[test]
fn prunes_obsolete_entry_and_classifies_resend() {
    // Desired {A}, observed {A, B} -> remove B; A is re-sent and the
    // registry's duplicate refusal counts as already present.
    let registry = FakeRegistry::with_servers(&["alpha", "beta"]);
    let document = doc(r#"{"mcpServers": {"alpha": {"command": "x"}}}"#);

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.removed, 1);
    assert_eq!(result.added, 0);
    assert_eq!(result.already_present, 1);
    assert_eq!(result.failed, 0);
    assert!(!registry.contains("beta"));
    assert!(registry.contains("alpha"));
}

#[test]
fn matching_sets_short_circuit_all_mutation() {
    let registry = FakeRegistry::with_servers(&["alpha", "beta"]);
    let document = doc(
        r#"{"mcpServers": {
            "alpha": {"command": "x"},
            "beta": {"command": "y"}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.already_present, 2);
    assert_eq!(result.added + result.removed + result.failed, 0);
    assert!(registry.mutation_ops().is_empty());
}

#[test]
fn reconcile_twice_converges() {
    let registry = FakeRegistry::default();
    let document = doc(
        r#"{"mcpServers": {
            "alpha": {"command": "x"},
            "beta": {"serverUrl": "https://b.example/mcp"}
        }}"#,
    );
    let reconciler = RegistryReconciler::new(&registry);

    let first = reconciler.reconcile(&document);
    assert_eq!(first.added, 2);

    registry.ops.borrow_mut().clear();
    let second = reconciler.reconcile(&document);

    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(second.already_present, 2);
    assert!(registry.mutation_ops().is_empty());
}

#[test]
fn disabled_entries_are_invisible_to_the_diff() {
    // Observed {alpha} equals desired-after-filtering, so the disabled
    // entry neither breaks the short-circuit nor gets added.
    let registry = FakeRegistry::with_servers(&["alpha"]);
    let document = doc(
        r#"{"mcpServers": {
            "alpha": {"command": "x"},
            "muted": {"command": "y", "disabled": true}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.already_present, 1);
    assert!(registry.mutation_ops().is_empty());
    assert!(!registry.contains("muted"));
}

#[test]
fn disabled_entry_is_pruned_when_registered() {
    let registry = FakeRegistry::with_servers(&["muted"]);
    let document = doc(
        r#"{"mcpServers": {
            "muted": {"command": "y", "disabled": true}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.removed, 1);
    assert!(!registry.contains("muted"));
}

#[test]
fn observe_failure_fails_open_to_adding_everything() {
    let registry = FakeRegistry {
        list_fails: true,
        ..Default::default()
    };
    let document = doc(
        r#"{"mcpServers": {
            "alpha": {"command": "x"},
            "beta": {"command": "y"}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.added, 2);
    assert_eq!(result.failed, 0);
    assert!(registry.contains("alpha"));
    assert!(registry.contains("beta"));
}

#[test]
fn remove_failure_does_not_block_remaining_prunes() {
    let registry = FakeRegistry {
        servers: RefCell::new(
            ["stuck", "gone"].iter().map(|s| s.to_string()).collect(),
        ),
        remove_fails_for: BTreeSet::from(["stuck".to_string()]),
        ..Default::default()
    };
    let document = doc(r#"{"mcpServers": {"alpha": {"command": "x"}}}"#);

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.removed, 1);
    assert_eq!(result.failed, 1);
    assert!(!registry.contains("gone"));
    assert_eq!(result.added, 1);
}

#[test]
fn entry_without_command_or_url_fails_alone() {
    let registry = FakeRegistry::default();
    let document = doc(
        r#"{"mcpServers": {
            "broken": {"args": ["only-args"]},
            "fine": {"command": "x"}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.failed, 1);
    assert_eq!(result.added, 1);
    assert!(registry.contains("fine"));
    assert!(!registry.contains("broken"));
}

#[test]
fn malformed_document_entry_counts_failed() {
    let registry = FakeRegistry::default();
    let document = doc(
        r#"{"mcpServers": {
            "bad": {"args": "not-a-list"},
            "good": {"command": "x"}
        }}"#,
    );

    let result = RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(result.failed, 1);
    assert_eq!(result.added, 1);
}

#[test]
fn operations_replay_in_document_order() {
    let registry = FakeRegistry::default();
    let document = doc(
        r#"{"mcpServers": {
            "zeta": {"command": "z"},
            "alpha": {"command": "a"}
        }}"#,
    );

    RegistryReconciler::new(&registry).reconcile(&document);

    assert_eq!(
        registry.mutation_ops(),
        vec!["add zeta".to_string(), "add alpha".to_string()]
    );
}

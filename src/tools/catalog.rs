//! Tool catalog: ordered, queryable set of operation descriptors.
//!
//! A catalog is resolved once per session by discovery (§ the three tiers in
//! [`crate::tools::discovery`]) and frozen into the session state. Entries
//! keep insertion order; `by_kind` and `by_category` return descriptors in
//! the order they were inserted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// Operation kind of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads a resource without modifying it.
    Read,
    /// Modifies a resource.
    Edit,
    /// Runs or controls an external process.
    Execute,
    /// Retrieves data from outside the workspace.
    Fetch,
    /// Anything the bridge has no built-in notion of.
    #[serde(other)]
    Other,
}

/// One operation descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique operation name (e.g. `fs/read`).
    pub name: String,
    /// Operation kind.
    pub kind: ToolKind,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the operation parameters.
    #[serde(default)]
    pub parameter_schema: Value,
    /// Whether invoking this operation needs a permission round-trip.
    #[serde(default)]
    pub requires_permission: bool,
    /// Category tags for grouping.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Calls are forwarded verbatim over the client's extension channel
    /// instead of a built-in handler. Set by discovery for Tier-1 entries
    /// with no built-in counterpart; never on the wire.
    #[serde(skip)]
    pub passthrough: bool,
}

/// Ordered, name-indexed tool catalog.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` when a descriptor with the same name is
    /// already present.
    pub fn push(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.by_name(&descriptor.name).is_some() {
            return Err(AppError::Tool(format!(
                "duplicate tool name '{}' in catalog",
                descriptor.name
            )));
        }
        self.entries.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by exact name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }

    /// All descriptors of one kind, in insertion order.
    #[must_use]
    pub fn by_kind(&self, kind: ToolKind) -> Vec<&ToolDescriptor> {
        self.entries.iter().filter(|d| d.kind == kind).collect()
    }

    /// All descriptors tagged with a category, in insertion order.
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<&ToolDescriptor> {
        self.entries
            .iter()
            .filter(|d| d.categories.iter().any(|c| c == category))
            .collect()
    }

    /// Iterate descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter()
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Built-in tool set ─────────────────────────────────────────────────────────

/// Names of the operations the bridge implements natively.
pub const BUILTIN_TOOLS: &[&str] = &[
    "fs/read",
    "fs/write",
    "process/run",
    "process/poll",
    "process/output",
    "process/kill",
];

/// Whether `name` has a built-in handler.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TOOLS.contains(&name)
}

/// The fixed Tier-3 default catalog.
///
/// Mutating operations (`fs/write`, `process/run`, `process/kill`) carry the
/// permission flag; read-only ones do not.
#[must_use]
pub fn default_catalog() -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for descriptor in builtin_descriptors() {
        // Names are distinct constants; push cannot collide here.
        let _ = catalog.push(descriptor);
    }
    catalog
}

/// Derive the Tier-2 approximate catalog from declared capability flags.
#[must_use]
pub fn catalog_from_capabilities(
    caps: &crate::protocol::message::ClientCapabilities,
) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for descriptor in builtin_descriptors() {
        let declared = match descriptor.name.as_str() {
            "fs/read" => caps.fs_read,
            "fs/write" => caps.fs_write,
            name => name.starts_with("process/") && caps.process_run,
        };
        if declared {
            let _ = catalog.push(descriptor);
        }
    }
    catalog
}

fn builtin_descriptors() -> Vec<ToolDescriptor> {
    vec![
        descriptor(
            "fs/read",
            ToolKind::Read,
            "Read a named resource from the client workspace",
            false,
            &["fs"],
        ),
        descriptor(
            "fs/write",
            ToolKind::Edit,
            "Write a named resource in the client workspace",
            true,
            &["fs"],
        ),
        descriptor(
            "process/run",
            ToolKind::Execute,
            "Run a named process on the client side",
            true,
            &["process"],
        ),
        descriptor(
            "process/poll",
            ToolKind::Execute,
            "Poll a running process for its status",
            false,
            &["process"],
        ),
        descriptor(
            "process/output",
            ToolKind::Execute,
            "Read accumulated output of a running process",
            false,
            &["process"],
        ),
        descriptor(
            "process/kill",
            ToolKind::Execute,
            "Terminate a running process",
            true,
            &["process"],
        ),
    ]
}

fn descriptor(
    name: &str,
    kind: ToolKind,
    description: &str,
    requires_permission: bool,
    categories: &[&str],
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_owned(),
        kind,
        description: description.to_owned(),
        parameter_schema: serde_json::json!({ "type": "object" }),
        requires_permission,
        categories: categories.iter().map(|&c| c.to_owned()).collect(),
        passthrough: false,
    }
}

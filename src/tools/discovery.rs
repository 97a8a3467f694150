//! Capability discovery: resolve which operations the client supports.
//!
//! Three tiers, first success wins:
//!
//! 1. **Catalog** — ask the client for an explicit operation catalog via
//!    `tools/catalog`.
//! 2. **Capability flags** — derive an approximate built-in subset from the
//!    boolean flags declared at `initialize`.
//! 3. **Default** — the fixed built-in tool set.
//!
//! Discovery runs once per session; the winning tier is recorded in the
//! session state for observability. Tier-1 entries with no built-in
//! counterpart are marked pass-through: the executor forwards those calls
//! verbatim over the client's `tools/invoke` extension channel, keeping the
//! bridge forward-compatible with client-introduced operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::protocol::message::ClientCapabilities;
use crate::tools::catalog::{
    catalog_from_capabilities, default_catalog, is_builtin, ToolCatalog, ToolDescriptor,
};
use crate::transport::conn::Connection;
use crate::Result;

/// Which fallback strategy produced a session's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTier {
    /// Tier 1: explicit catalog from the client.
    Catalog,
    /// Tier 2: derived from declared capability flags.
    CapabilityFlags,
    /// Tier 3: fixed default set.
    Default,
}

/// Wire shape of the `tools/catalog` response.
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    tools: Vec<ToolDescriptor>,
}

/// Resolve the tool catalog for one session.
///
/// Never fails: a declined or malformed Tier-1 exchange falls through to
/// Tier 2, and an empty flag set falls through to Tier 3.
pub async fn discover(
    conn: &Connection,
    caps: &ClientCapabilities,
    timeout: Duration,
) -> (ToolCatalog, DiscoveryTier) {
    if caps.tool_catalog {
        match query_catalog(conn, timeout).await {
            Ok(catalog) if !catalog.is_empty() => {
                debug!(conn = %conn.id(), tools = catalog.len(), "discovery resolved at tier 1");
                return (catalog, DiscoveryTier::Catalog);
            }
            Ok(_) => {
                debug!(conn = %conn.id(), "client returned an empty catalog, falling back");
            }
            Err(err) => {
                debug!(conn = %conn.id(), error = %err, "tools/catalog declined or failed, falling back");
            }
        }
    }

    let from_flags = catalog_from_capabilities(caps);
    if !from_flags.is_empty() {
        debug!(conn = %conn.id(), tools = from_flags.len(), "discovery resolved at tier 2");
        return (from_flags, DiscoveryTier::CapabilityFlags);
    }

    debug!(conn = %conn.id(), "discovery resolved at tier 3 (default tool set)");
    (default_catalog(), DiscoveryTier::Default)
}

/// Tier 1: request and parse the explicit catalog.
///
/// Entries with names the bridge has no built-in handler for are marked
/// pass-through. Duplicate names are skipped with a warning rather than
/// failing the whole exchange.
async fn query_catalog(conn: &Connection, timeout: Duration) -> Result<ToolCatalog> {
    let raw = conn.send_request("tools/catalog", &json!({}), timeout).await?;

    let parsed: CatalogResponse = serde_json::from_value(raw)
        .map_err(|e| crate::AppError::Protocol(format!("invalid tools/catalog response: {e}")))?;

    let mut catalog = ToolCatalog::new();
    for mut descriptor in parsed.tools {
        descriptor.passthrough = !is_builtin(&descriptor.name);
        if let Err(err) = catalog.push(descriptor) {
            warn!(conn = %conn.id(), error = %err, "skipping duplicate catalog entry");
        }
    }
    Ok(catalog)
}

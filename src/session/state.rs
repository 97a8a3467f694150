//! Session metadata and immutable per-session cached state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::bridge::agent::AgentInstance;
use crate::protocol::message::ClientCapabilities;
use crate::tools::catalog::ToolCatalog;
use crate::tools::discovery::DiscoveryTier;

/// Session-scoped memory of allow-always / reject-always permission
/// decisions, keyed by tool name.
///
/// Owned by the session metadata so the memory is destroyed with the
/// session: a later session re-registered under the same id starts with no
/// grants.
pub type PermissionGrants = Arc<Mutex<HashMap<String, bool>>>;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Created but no prompt handled yet.
    Uninitialized,
    /// A prompt has been accepted.
    Active,
    /// The active run was cancelled.
    Cancelled,
    /// Explicitly closed; eligible for immediate eviction.
    Closed,
}

/// Mutable per-session bookkeeping owned by the registry.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque session id.
    pub id: String,
    /// Id of the transport connection that owns the session.
    pub connection_id: String,
    /// Capability flags the owning client declared at `initialize`.
    pub capabilities: ClientCapabilities,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last inbound activity, advanced by the registry on every touch.
    pub last_activity: DateTime<Utc>,
    /// Set when the owning transport disconnects; cleared on resume.
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Lifecycle phase.
    pub lifecycle: SessionLifecycle,
    /// Allow-always / reject-always decisions accumulated this session.
    pub grants: PermissionGrants,
}

impl Session {
    /// Create session metadata owned by `connection_id`.
    #[must_use]
    pub fn new(id: String, connection_id: String, capabilities: ClientCapabilities) -> Self {
        let now = Utc::now();
        Self {
            id,
            connection_id,
            capabilities,
            created_at: now,
            last_activity: now,
            disconnected_at: None,
            lifecycle: SessionLifecycle::Uninitialized,
            grants: PermissionGrants::default(),
        }
    }
}

/// Immutable cached state for one session.
///
/// Never mutated after construction: a session whose capabilities change
/// gets a replacement `SessionState` swapped in under the same id, keeping
/// concurrent readers lock-free on their own `Arc` snapshot.
pub struct SessionState {
    /// Discovered tool catalog.
    pub catalog: ToolCatalog,
    /// Configured agent instance driving this session's prompts.
    pub agent: Arc<dyn AgentInstance>,
    /// Which discovery tier produced the catalog.
    pub tier: DiscoveryTier,
}

impl SessionState {
    /// Construct a frozen session state.
    #[must_use]
    pub fn new(catalog: ToolCatalog, agent: Arc<dyn AgentInstance>, tier: DiscoveryTier) -> Self {
        Self {
            catalog,
            agent,
            tier,
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("catalog_len", &self.catalog.len())
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

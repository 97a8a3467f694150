//! Session registry: per-session cached state, idle sweep, resume guard.
//!
//! The registry owns the only two structures touched from multiple logical
//! flows besides the pending-request maps: the session map and the
//! "currently resuming" set. Both are explicit fields of a registry instance
//! passed by reference — never process-wide singletons — so multiple bridges
//! can coexist in tests.
//!
//! # The resume / sweep race
//!
//! Transferring a session between connections must not race the periodic
//! idle sweep: the sweep skips any id in the resuming set, and membership is
//! added before the transfer begins and removed by [`ResumeGuard`]'s `Drop`
//! regardless of how the transfer ends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SweepConfig;
use crate::session::state::{Session, SessionLifecycle, SessionState};
use crate::{AppError, Result};

/// One registry slot: mutable metadata plus the frozen state snapshot.
struct SessionEntry {
    meta: Session,
    state: Arc<SessionState>,
}

/// Owner of all per-session cached state, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    /// Ids currently mid-transfer; read by [`SessionRegistry::sweep`].
    resuming: StdMutex<HashSet<String>>,
}

/// Removes the guarded id from the resuming set when dropped, so the sweep
/// exclusion ends even when the transfer unwinds early.
pub struct ResumeGuard<'a> {
    registry: &'a SessionRegistry,
    id: String,
}

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.registry.resuming.lock() {
            set.remove(&self.id);
        }
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any previous entry under the same id.
    pub async fn register(&self, meta: Session, state: Arc<SessionState>) {
        let id = meta.id.clone();
        let mut sessions = self.sessions.lock().await;
        if sessions.insert(id.clone(), SessionEntry { meta, state }).is_some() {
            debug!(session_id = %id, "replaced existing registry entry");
        }
    }

    /// Frozen state snapshot for a session, when registered.
    pub async fn get(&self, id: &str) -> Option<Arc<SessionState>> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|entry| Arc::clone(&entry.state))
    }

    /// Metadata snapshot for a session, when registered.
    pub async fn meta(&self, id: &str) -> Option<Session> {
        self.sessions.lock().await.get(id).map(|e| e.meta.clone())
    }

    /// Remove a session. Returns whether an entry existed.
    pub async fn evict(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    /// Swap in a replacement state under the same id (construct-new-and-swap,
    /// never in-place mutation).
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the session is not registered.
    pub async fn replace_state(&self, id: &str, state: Arc<SessionState>) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not registered")))?;
        entry.state = state;
        Ok(())
    }

    /// Advance a session's last-activity stamp.
    pub async fn touch(&self, id: &str) {
        if let Some(entry) = self.sessions.lock().await.get_mut(id) {
            entry.meta.last_activity = Utc::now();
        }
    }

    /// Set a session's lifecycle phase.
    pub async fn set_lifecycle(&self, id: &str, lifecycle: SessionLifecycle) {
        if let Some(entry) = self.sessions.lock().await.get_mut(id) {
            entry.meta.lifecycle = lifecycle;
        }
    }

    /// Enter the protected resume window for `id`.
    ///
    /// While the returned guard lives the sweep will not evict the session.
    #[must_use]
    pub fn begin_resume(&self, id: &str) -> ResumeGuard<'_> {
        if let Ok(mut set) = self.resuming.lock() {
            set.insert(id.to_owned());
        }
        ResumeGuard {
            registry: self,
            id: id.to_owned(),
        }
    }

    /// Transfer a registered session to a new owning connection.
    ///
    /// Clears any pending disconnect stamp and refreshes activity. Callers
    /// must hold a [`ResumeGuard`] for `id` across the whole transfer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the session is not registered.
    pub async fn transfer(&self, id: &str, new_connection_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not registered")))?;
        entry.meta.connection_id = new_connection_id.to_owned();
        entry.meta.disconnected_at = None;
        entry.meta.last_activity = Utc::now();
        Ok(())
    }

    /// Stamp every session owned by `connection_id` as disconnected.
    ///
    /// Stamped sessions survive until the grace window elapses, so a client
    /// that reconnects and resumes promptly finds its session intact.
    pub async fn mark_disconnected(&self, connection_id: &str) {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        for entry in sessions.values_mut() {
            if entry.meta.connection_id == connection_id && entry.meta.disconnected_at.is_none() {
                debug!(session_id = %entry.meta.id, "owning connection gone, grace window starts");
                entry.meta.disconnected_at = Some(now);
            }
        }
    }

    /// One sweep pass: evict idle, orphaned, and closed sessions.
    ///
    /// Ids in the resuming set are always skipped. Returns the evicted ids.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        idle_after: Duration,
        disconnect_grace: Duration,
    ) -> Vec<String> {
        let resuming: HashSet<String> = match self.resuming.lock() {
            Ok(set) => set.clone(),
            Err(_) => return Vec::new(),
        };

        let mut sessions = self.sessions.lock().await;
        let mut evicted = Vec::new();

        sessions.retain(|id, entry| {
            if resuming.contains(id) {
                return true;
            }

            let expired = match entry.meta.lifecycle {
                SessionLifecycle::Closed => true,
                _ => match entry.meta.disconnected_at {
                    Some(gone) => to_std(now - gone) > disconnect_grace,
                    None => to_std(now - entry.meta.last_activity) > idle_after,
                },
            };

            if expired {
                evicted.push(id.clone());
            }
            !expired
        });

        if !evicted.is_empty() {
            info!(count = evicted.len(), "idle sweep evicted sessions");
        }
        evicted
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Spawn the periodic idle-sweep task.
pub fn spawn_sweep_task(
    registry: Arc<SessionRegistry>,
    config: SweepConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(config.interval_seconds);
    let idle_after = Duration::from_secs(config.idle_seconds);
    let grace = Duration::from_secs(config.disconnect_grace_seconds);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sweep task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = registry.sweep(Utc::now(), idle_after, grace).await;
                    for id in evicted {
                        debug!(session_id = %id, "session evicted by sweep");
                    }
                }
            }
        }
    })
}

/// Clamp a chrono duration into a std duration (negative becomes zero).
fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

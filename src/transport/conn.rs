//! Connection core shared by both transport adapters.
//!
//! A [`Connection`] owns the outbound frame channel and the pending-request
//! map for one peer. Both adapters (stdio stream and local socket) feed
//! inbound frames through [`Connection::accept_response`] and write outbound
//! frames through the queue drained by their writer task.
//!
//! Request ids are drawn from a per-connection `AtomicU64` starting at 1 —
//! globally unique for the connection's lifetime and never reused, never
//! derived from memory addresses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::protocol::message::{
    self, notification_frame, request_frame, RpcError,
};
use crate::{AppError, Result};

/// One outstanding outbound request awaiting its response.
struct PendingRequest {
    /// When the request was written to the wire.
    issued_at: DateTime<Utc>,
    /// Resolved by the matching response, or by disconnect/timeout cleanup.
    tx: oneshot::Sender<Result<Value>>,
}

/// Request/response correlator for one peer connection.
pub struct Connection {
    /// Stable identifier for logging and session ownership.
    id: String,
    /// Monotonic request id source.
    next_id: AtomicU64,
    /// Outstanding requests keyed by request id.
    pending: Mutex<HashMap<u64, PendingRequest>>,
    /// Serialised frames consumed by the adapter's writer task.
    outbound: mpsc::Sender<String>,
}

impl Connection {
    /// Create a connection around an outbound frame queue.
    #[must_use]
    pub fn new(id: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Issue an outbound request and suspend until the matching response,
    /// `timeout`, or disconnect.
    ///
    /// Entry removal is tied to this future's lifetime: resolution, timeout,
    /// and a caller dropping the future mid-wait all clear the pending entry,
    /// so a late response is classified as unmatched.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] — no response within `timeout`.
    /// - [`AppError::Disconnected`] — the writer queue or the connection
    ///   closed before a response arrived.
    /// - [`AppError::Transport`] — the peer answered with a JSON-RPC error.
    pub async fn send_request(
        &self,
        method: &str,
        params: &Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let Ok(mut pending) = self.pending.lock() else {
                return Err(AppError::Transport("pending-request map poisoned".into()));
            };
            pending.insert(
                id,
                PendingRequest {
                    issued_at: Utc::now(),
                    tx,
                },
            );
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let frame = request_frame(id, method, params);
        if self.outbound.send(frame).await.is_err() {
            return Err(AppError::Disconnected(format!(
                "connection {} closed before request {method}#{id} was written",
                self.id
            )));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::Disconnected(format!(
                "connection {} closed while awaiting {method}#{id}",
                self.id
            ))),
            Err(_) => Err(AppError::Timeout(format!(
                "no response to {method}#{id} within {timeout:?}"
            ))),
        }
    }

    /// Send a notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Disconnected`] when the writer queue is closed.
    pub async fn send_notification(&self, method: &str, params: &Value) -> Result<()> {
        let frame = notification_frame(method, params);
        self.outbound.send(frame).await.map_err(|_| {
            AppError::Disconnected(format!(
                "connection {} closed before notification {method} was written",
                self.id
            ))
        })
    }

    /// Write a success response to an inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Disconnected`] when the writer queue is closed.
    pub async fn send_response(&self, id: &Value, result: &Value) -> Result<()> {
        let frame = message::response_frame(id, result);
        self.outbound
            .send(frame)
            .await
            .map_err(|_| AppError::Disconnected(format!("connection {} closed", self.id)))
    }

    /// Write an error response to an inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Disconnected`] when the writer queue is closed.
    pub async fn send_error(&self, id: &Value, error: &RpcError) -> Result<()> {
        let frame = message::error_frame(id, error);
        self.outbound
            .send(frame)
            .await
            .map_err(|_| AppError::Disconnected(format!("connection {} closed", self.id)))
    }

    /// Resolve the pending request matching a response frame.
    ///
    /// A response whose id does not match any outstanding request is logged
    /// and ignored; the original requests stay pending until their own
    /// timeouts.
    pub fn accept_response(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) {
        let Some(numeric) = id.as_u64() else {
            warn!(conn = %self.id, ?id, "response with non-numeric id, ignoring");
            return;
        };

        let entry = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&numeric),
            Err(_) => {
                warn!(conn = %self.id, id = numeric, "pending-request map poisoned, dropping response");
                return;
            }
        };
        match entry {
            Some(request) => {
                let waited = Utc::now() - request.issued_at;
                debug!(conn = %self.id, id = numeric, waited_ms = waited.num_milliseconds(), "response matched");
                let resolved = outcome.map_err(|err| {
                    AppError::Transport(format!("peer error {}: {}", err.code, err.message))
                });
                if request.tx.send(resolved).is_err() {
                    debug!(conn = %self.id, id = numeric, "requester gave up before response arrived");
                }
            }
            None => {
                debug!(conn = %self.id, id = numeric, "response with no matching pending request, ignoring");
            }
        }
    }

    /// Fail every outstanding request with a synthetic disconnect error.
    ///
    /// Called by the adapters when the peer stream closes so no caller stays
    /// suspended on a request the peer can no longer answer.
    pub fn fail_all_pending(&self, reason: &str) {
        let drained: Vec<(u64, PendingRequest)> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => Vec::new(),
        };
        if drained.is_empty() {
            return;
        }
        warn!(conn = %self.id, count = drained.len(), reason, "failing outstanding requests");
        for (id, request) in drained {
            let _ = request.tx.send(Err(AppError::Disconnected(format!(
                "request #{id} abandoned: {reason}"
            ))));
        }
    }

    /// Number of outstanding requests (test observability).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map_or(0, |pending| pending.len())
    }
}

/// Removes the pending entry when the owning `send_request` future ends,
/// whether it resolved, timed out, or was dropped mid-wait.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<u64, PendingRequest>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

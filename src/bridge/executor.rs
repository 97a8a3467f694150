//! Tool executor: wraps every invocation in lifecycle tracking and, for
//! mutating operations, a permission round-trip.
//!
//! One executor exists per prompt run. Each `invoke` emits a start event,
//! optionally suspends on `session/request_permission`, executes the call
//! against the client, emits progress, and forgets the tracker record on
//! every exit path — including errors and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::message::{permission_options, PermissionOutcome};
use crate::session::state::{PermissionGrants, SessionState};
use crate::tools::catalog::ToolDescriptor;
use crate::tools::tracker::{call_id, ToolCallStatus, ToolCallTracker, ToolLocation};
use crate::transport::conn::Connection;
use crate::{AppError, Result};

/// Maximum length of the output summary kept on a tool-call record.
const OUTPUT_SUMMARY_MAX: usize = 256;

/// What one tool invocation produced, from the agent's point of view.
#[derive(Debug)]
pub enum ToolOutcome {
    /// The call succeeded; the raw result is attached.
    Success(Value),
    /// The operator declined the call. Terminal and informational — the
    /// agent must treat the denial string as the result, never retry.
    Denied(String),
    /// The call failed in a way the agent may retry (bounded by the agent).
    Retry(String),
}

/// Per-run tool invocation engine.
pub struct ToolExecutor {
    conn: Arc<Connection>,
    session_id: String,
    state: Arc<SessionState>,
    tracker: Mutex<ToolCallTracker>,
    grants: PermissionGrants,
    permission_timeout: Duration,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl ToolExecutor {
    /// Build an executor for one prompt run.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Arc<Connection>,
        session_id: String,
        state: Arc<SessionState>,
        grants: PermissionGrants,
        permission_timeout: Duration,
        request_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn,
            session_id,
            state,
            tracker: Mutex::new(ToolCallTracker::new()),
            grants,
            permission_timeout,
            request_timeout,
            cancel,
        }
    }

    /// Invoke one tool against the client.
    ///
    /// `target` feeds the deterministic call id together with the operation
    /// name; `locations` are forwarded on the start event.
    ///
    /// # Errors
    ///
    /// - [`AppError::Cancelled`] — the run was cancelled; the record has
    ///   been forgotten.
    /// - [`AppError::Tool`] — lifecycle violation (e.g. a colliding live
    ///   call id).
    ///
    /// Ordinary execution failures do not error: they come back as
    /// [`ToolOutcome::Retry`], and permission rejections as
    /// [`ToolOutcome::Denied`].
    pub async fn invoke(
        &self,
        name: &str,
        target: &str,
        args: Value,
        locations: Vec<ToolLocation>,
    ) -> Result<ToolOutcome> {
        let Some(descriptor) = self.state.catalog.by_name(name).cloned() else {
            return Ok(ToolOutcome::Retry(format!(
                "tool '{name}' is not in this session's catalog"
            )));
        };

        let id = call_id(name, target);
        let title = format!("{name} {target}");

        let start = self
            .tracker
            .lock()
            .await
            .start(&id, &title, descriptor.kind, locations)?;
        self.send_update(&serde_json::to_value(&start).unwrap_or(Value::Null))
            .await;

        let result = self.invoke_inner(&descriptor, &id, args).await;

        // Cleanup must fire on every path, the error paths included.
        self.tracker.lock().await.forget(&id);

        result
    }

    /// Emit an agent text chunk to the client (best effort).
    pub async fn send_text_chunk(&self, text: &str) {
        self.send_update(&json!({
            "sessionUpdate": "agent_message_chunk",
            "text": text,
        }))
        .await;
    }

    /// Whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of live tracker records (test observability).
    pub async fn live_calls(&self) -> usize {
        self.tracker.lock().await.live_count()
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// The tracked portion of an invocation; the caller owns the forget.
    async fn invoke_inner(
        &self,
        descriptor: &ToolDescriptor,
        id: &str,
        args: Value,
    ) -> Result<ToolOutcome> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled("run cancelled before tool call".into()));
        }

        if descriptor.requires_permission {
            match self.check_permission(descriptor, id).await? {
                Permission::Granted => {}
                Permission::Denied(reason) => {
                    self.emit_progress(id, ToolCallStatus::Failed, Some(reason.clone()))
                        .await;
                    return Ok(ToolOutcome::Denied(reason));
                }
            }
        }

        self.emit_progress(id, ToolCallStatus::InProgress, None).await;

        let execution = if descriptor.passthrough {
            // Client-introduced operation: forward verbatim over the
            // extension channel.
            self.conn
                .send_request(
                    "tools/invoke",
                    &json!({
                        "sessionId": self.session_id,
                        "name": descriptor.name,
                        "args": args,
                    }),
                    self.request_timeout,
                )
                .await
        } else {
            self.conn
                .send_request(
                    &descriptor.name,
                    &json!({
                        "sessionId": self.session_id,
                        "args": args,
                    }),
                    self.request_timeout,
                )
                .await
        };

        match execution {
            Ok(value) => {
                let summary = summarize(&value);
                self.emit_progress(id, ToolCallStatus::Completed, Some(summary))
                    .await;
                Ok(ToolOutcome::Success(value))
            }
            Err(AppError::Cancelled(msg)) => Err(AppError::Cancelled(msg)),
            Err(err) => {
                let reason = err.to_string();
                self.emit_progress(id, ToolCallStatus::Failed, Some(reason.clone()))
                    .await;
                Ok(ToolOutcome::Retry(reason))
            }
        }
    }

    /// Resolve the permission gate for a mutating operation.
    ///
    /// Session-scoped always-decisions short-circuit the round-trip. An
    /// unanswered request resolves as a rejection when the permission
    /// timeout elapses; cancellation resolves it early with a
    /// cancellation-shaped denial — the pending future is never left
    /// dangling.
    async fn check_permission(&self, descriptor: &ToolDescriptor, id: &str) -> Result<Permission> {
        if let Some(&always) = self.grants.lock().await.get(&descriptor.name) {
            return Ok(if always {
                Permission::Granted
            } else {
                Permission::Denied(format!(
                    "'{}' was rejected for the rest of this session",
                    descriptor.name
                ))
            });
        }

        let record = self.tracker.lock().await.get(id).cloned();
        let tool_call = record.map_or(Value::Null, |r| {
            json!({
                "toolCallId": r.call_id,
                "title": r.title,
                "kind": r.kind,
                "status": r.status,
                "locations": r.locations,
            })
        });

        let params = json!({
            "sessionId": self.session_id,
            "toolCall": tool_call,
            "options": permission_options(),
        });

        let response = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                debug!(session_id = %self.session_id, call_id = id, "permission wait cancelled");
                return Ok(Permission::Denied("run cancelled while awaiting permission".into()));
            }

            res = self.conn.send_request(
                "session/request_permission",
                &params,
                self.permission_timeout,
            ) => res,
        };

        let outcome = match response {
            Ok(raw) => match serde_json::from_value::<PermissionOutcome>(raw) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        session_id = %self.session_id,
                        call_id = id,
                        error = %err,
                        "unparseable permission outcome, treating as rejection"
                    );
                    return Ok(Permission::Denied(format!(
                        "permission outcome could not be parsed: {err}"
                    )));
                }
            },
            Err(AppError::Timeout(_)) => {
                warn!(
                    session_id = %self.session_id,
                    call_id = id,
                    "permission request timed out, treating as rejection"
                );
                return Ok(Permission::Denied(
                    "permission request timed out and was treated as a rejection".into(),
                ));
            }
            Err(err) => {
                warn!(session_id = %self.session_id, call_id = id, error = %err, "permission request failed");
                return Ok(Permission::Denied(format!("permission request failed: {err}")));
            }
        };

        Ok(match outcome {
            PermissionOutcome::Selected { option_id } => match option_id.as_str() {
                "allow_once" => Permission::Granted,
                "allow_always" => {
                    self.grants
                        .lock()
                        .await
                        .insert(descriptor.name.clone(), true);
                    Permission::Granted
                }
                "reject_always" => {
                    self.grants
                        .lock()
                        .await
                        .insert(descriptor.name.clone(), false);
                    Permission::Denied(format!(
                        "'{}' was rejected for the rest of this session",
                        descriptor.name
                    ))
                }
                _ => Permission::Denied(format!("'{}' was rejected", descriptor.name)),
            },
            PermissionOutcome::Cancelled => {
                Permission::Denied("permission prompt was dismissed".into())
            }
        })
    }

    /// Record a transition and notify the client (best effort).
    async fn emit_progress(&self, id: &str, status: ToolCallStatus, output: Option<String>) {
        let event = self.tracker.lock().await.progress(id, status, output);
        match event {
            Ok(event) => {
                self.send_update(&serde_json::to_value(&event).unwrap_or(Value::Null))
                    .await;
            }
            Err(err) => {
                debug!(call_id = id, error = %err, "progress transition skipped");
            }
        }
    }

    /// Send a `session/update` notification, logging delivery failures.
    async fn send_update(&self, update: &Value) {
        let params = json!({
            "sessionId": self.session_id,
            "update": update,
        });
        if let Err(err) = self.conn.send_notification("session/update", &params).await {
            debug!(session_id = %self.session_id, error = %err, "session/update not delivered");
        }
    }
}

/// Internal permission gate result.
enum Permission {
    Granted,
    Denied(String),
}

/// Compact one-line summary of a tool result for the record.
fn summarize(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if raw.len() > OUTPUT_SUMMARY_MAX {
        let mut cut = OUTPUT_SUMMARY_MAX;
        while !raw.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &raw[..cut])
    } else {
        raw
    }
}

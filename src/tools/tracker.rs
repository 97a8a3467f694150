//! Tool-call lifecycle tracker.
//!
//! Pure in-memory state machine for in-flight tool invocations — no I/O.
//! Callers feed the returned event payloads into `session/update`
//! notifications; the tracker itself never touches a transport.
//!
//! # Lifecycle
//!
//! ```text
//! start ──► pending ──progress──► in_progress ──progress──► completed
//!                                                        └─► failed
//! forget removes the record at any point and is idempotent.
//! ```
//!
//! Exactly one live record may exist per call id; `start` on a live id is an
//! error. `forget` on an unknown id is a no-op because cleanup paths call it
//! unconditionally and must never fail.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tools::catalog::ToolKind;
use crate::{AppError, Result};

/// Lifecycle status of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Issued but not yet executing.
    Pending,
    /// Executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ToolCallStatus {
    /// Whether this status ends the lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Source-location hint attached to a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolLocation {
    /// File or resource path.
    pub path: String,
    /// Optional 1-based line number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// One live tool-call record.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Deterministic call id (operation + target).
    pub call_id: String,
    /// Display title.
    pub title: String,
    /// Operation kind.
    pub kind: ToolKind,
    /// Current status.
    pub status: ToolCallStatus,
    /// Location hints.
    pub locations: Vec<ToolLocation>,
    /// Latest output summary.
    pub output: Option<String>,
}

/// `session/update` payload announcing a new tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    /// Update discriminator, always `"tool_call"`.
    pub session_update: &'static str,
    /// Call id.
    pub tool_call_id: String,
    /// Display title.
    pub title: String,
    /// Operation kind.
    pub kind: ToolKind,
    /// Initial status.
    pub status: ToolCallStatus,
    /// Location hints.
    pub locations: Vec<ToolLocation>,
}

/// `session/update` payload reporting tool-call progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Update discriminator, always `"tool_call_update"`.
    pub session_update: &'static str,
    /// Call id.
    pub tool_call_id: String,
    /// New status.
    pub status: ToolCallStatus,
    /// Output summary, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Build the deterministic call id for an operation against a target.
#[must_use]
pub fn call_id(operation: &str, target: &str) -> String {
    format!("{operation}:{target}")
}

/// In-memory lifecycle tracker for one session's tool calls.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    live: HashMap<String, ToolCallRecord>,
}

impl ToolCallTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` when `call_id` already has a live record.
    pub fn start(
        &mut self,
        call_id: &str,
        title: &str,
        kind: ToolKind,
        locations: Vec<ToolLocation>,
    ) -> Result<StartEvent> {
        if self.live.contains_key(call_id) {
            return Err(AppError::Tool(format!(
                "call id '{call_id}' already has a live record"
            )));
        }

        let record = ToolCallRecord {
            call_id: call_id.to_owned(),
            title: title.to_owned(),
            kind,
            status: ToolCallStatus::Pending,
            locations: locations.clone(),
            output: None,
        };
        self.live.insert(call_id.to_owned(), record);

        Ok(StartEvent {
            session_update: "tool_call",
            tool_call_id: call_id.to_owned(),
            title: title.to_owned(),
            kind,
            status: ToolCallStatus::Pending,
            locations,
        })
    }

    /// Record a status transition.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` when the id is unknown or its record already
    /// reached a terminal status.
    pub fn progress(
        &mut self,
        call_id: &str,
        status: ToolCallStatus,
        output: Option<String>,
    ) -> Result<ProgressEvent> {
        let record = self.live.get_mut(call_id).ok_or_else(|| {
            AppError::Tool(format!("progress on unknown call id '{call_id}'"))
        })?;

        if record.status.is_terminal() {
            return Err(AppError::Tool(format!(
                "progress on already-terminal call id '{call_id}'"
            )));
        }

        record.status = status;
        if output.is_some() {
            record.output.clone_from(&output);
        }

        Ok(ProgressEvent {
            session_update: "tool_call_update",
            tool_call_id: call_id.to_owned(),
            status,
            output,
        })
    }

    /// Stop tracking a call. Idempotent: unknown ids are a no-op.
    pub fn forget(&mut self, call_id: &str) {
        self.live.remove(call_id);
    }

    /// Whether a call id currently has a live record.
    #[must_use]
    pub fn is_live(&self, call_id: &str) -> bool {
        self.live.contains_key(call_id)
    }

    /// Number of live records.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Snapshot of one live record, when present.
    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&ToolCallRecord> {
        self.live.get(call_id)
    }
}

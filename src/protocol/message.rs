//! JSON-RPC 2.0 message envelope and wire types.
//!
//! The bridge speaks newline-delimited JSON-RPC 2.0 on both transports.
//! All wire field names are `camelCase` regardless of internal naming,
//! because the client implementations on the other side are external and
//! uncontrolled.
//!
//! # Frame classification
//!
//! [`Frame::classify`] inspects `result`/`error` **before** looking at
//! `method`: a frame carrying either is a response and must be routed to the
//! pending-request map. Routing a response into the request handler would
//! leave the original caller suspended forever.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// JSON-RPC protocol version carried on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: u32 = 1;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Structured JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code (JSON-RPC reserved ranges apply).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// `-32601 Method not found`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    /// `-32602 Invalid params`.
    #[must_use]
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: format!("invalid params: {detail}"),
            data: None,
        }
    }

    /// Map an [`AppError`] onto a structured JSON-RPC error.
    ///
    /// Protocol violations keep their reserved codes; everything else lands
    /// in the implementation-defined `-32000` range so the client can log a
    /// meaningful failure instead of seeing a dropped connection.
    #[must_use]
    pub fn from_app(err: &AppError) -> Self {
        let (code, message) = match err {
            AppError::Protocol(msg) => (-32600, format!("protocol: {msg}")),
            AppError::NotFound(msg) => (-32001, format!("not found: {msg}")),
            AppError::Session(msg) => (-32002, format!("session: {msg}")),
            other => (-32000, other.to_string()),
        };
        Self {
            code,
            message,
            data: None,
        }
    }
}

/// Raw frame shape used only for classification.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RpcError>,
}

/// One classified inbound JSON-RPC frame.
#[derive(Debug)]
pub enum Frame {
    /// Response to an outbound request issued by this side.
    Response {
        /// Correlation id echoed by the peer.
        id: Value,
        /// `Ok(result)` or `Err(error object)`.
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Inbound request expecting a response.
    Request {
        /// Peer-assigned id to echo back.
        id: Value,
        /// Method name.
        method: String,
        /// Method parameters.
        params: Value,
    },
    /// Inbound notification (no response expected).
    Notification {
        /// Method name.
        method: String,
        /// Method parameters.
        params: Value,
    },
}

impl Frame {
    /// Classify one raw line into a [`Frame`].
    ///
    /// Response detection runs first: any frame carrying `result` or `error`
    /// is a response even if a stray `method` field is present.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the line is not valid JSON or is
    /// neither a response, request, nor notification.
    pub fn classify(line: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(line)
            .map_err(|e| AppError::Protocol(format!("malformed frame: {e}")))?;

        if raw.result.is_some() || raw.error.is_some() {
            let id = raw
                .id
                .ok_or_else(|| AppError::Protocol("response frame without id".into()))?;
            let outcome = match raw.error {
                Some(err) => Err(err),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            return Ok(Self::Response { id, outcome });
        }

        let Some(method) = raw.method else {
            return Err(AppError::Protocol(
                "frame has neither result/error nor method".into(),
            ));
        };
        let params = raw.params.unwrap_or(Value::Null);

        match raw.id {
            Some(id) => Ok(Self::Request { id, method, params }),
            None => Ok(Self::Notification { method, params }),
        }
    }
}

// ── Outbound frame builders ───────────────────────────────────────────────────

/// Serialise an outbound request frame.
#[must_use]
pub fn request_frame(id: u64, method: &str, params: &Value) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Serialise an outbound notification frame.
#[must_use]
pub fn notification_frame(method: &str, params: &Value) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Serialise a success response to an inbound request.
#[must_use]
pub fn response_frame(id: &Value, result: &Value) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
    .to_string()
}

/// Serialise an error response to an inbound request.
#[must_use]
pub fn error_frame(id: &Value, error: &RpcError) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": error,
    })
    .to_string()
}

// ── Capability declarations ───────────────────────────────────────────────────

/// Boolean capability flags declared by the client during `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    /// Client can service `fs/read` calls.
    pub fs_read: bool,
    /// Client can service `fs/write` calls.
    pub fs_write: bool,
    /// Client can service the `process/*` call family.
    pub process_run: bool,
    /// Client answers `tools/catalog` with an explicit operation catalog.
    pub tool_catalog: bool,
}

impl ClientCapabilities {
    /// Whether any capability flag is set at all.
    #[must_use]
    pub fn any(&self) -> bool {
        self.fs_read || self.fs_write || self.process_run || self.tool_catalog
    }
}

/// Capabilities reported back by the bridge from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Wire protocol version.
    pub protocol_version: u32,
    /// Whether `session/resume` is supported.
    pub session_resume: bool,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            session_resume: true,
        }
    }
}

// ── Prompt & stop reasons ─────────────────────────────────────────────────────

/// Terminal disposition of a `session/prompt` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The agent finished its turn normally.
    EndTurn,
    /// The run was cancelled via `session/cancel`.
    Cancelled,
    /// The agent hit its usage limit mid-run.
    UsageLimit,
    /// The agent failed; a best-effort notification was already sent.
    Failed,
}

/// Result payload of `session/prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    /// Why the turn ended.
    pub stop_reason: StopReason,
}

// ── Permission round-trip ─────────────────────────────────────────────────────

/// Kind discriminator of one permission option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this one call.
    AllowOnce,
    /// Allow this tool for the rest of the session.
    AllowAlways,
    /// Reject this one call.
    RejectOnce,
    /// Reject this tool for the rest of the session.
    RejectAlways,
}

/// One selectable option in a permission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Stable identifier echoed back in the outcome.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Option kind.
    pub kind: PermissionOptionKind,
}

/// The fixed option set offered with every permission request.
#[must_use]
pub fn permission_options() -> Vec<PermissionOption> {
    vec![
        PermissionOption {
            option_id: "allow_once".into(),
            name: "Allow".into(),
            kind: PermissionOptionKind::AllowOnce,
        },
        PermissionOption {
            option_id: "allow_always".into(),
            name: "Always allow this session".into(),
            kind: PermissionOptionKind::AllowAlways,
        },
        PermissionOption {
            option_id: "reject_once".into(),
            name: "Reject".into(),
            kind: PermissionOptionKind::RejectOnce,
        },
        PermissionOption {
            option_id: "reject_always".into(),
            name: "Always reject this session".into(),
            kind: PermissionOptionKind::RejectAlways,
        },
    ]
}

/// Client answer to `session/request_permission`.
///
/// Wire shape: `{"outcome": "selected", "optionId": "..."}` or
/// `{"outcome": "cancelled"}` — the field casing is per-variant because the
/// enum-level rename only covers variant tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum PermissionOutcome {
    /// The operator picked one of the offered options.
    #[serde(rename = "selected", rename_all = "camelCase")]
    Selected {
        /// `option_id` of the chosen [`PermissionOption`].
        option_id: String,
    },
    /// The prompt was dismissed or the turn was cancelled client-side.
    #[serde(rename = "cancelled")]
    Cancelled,
}

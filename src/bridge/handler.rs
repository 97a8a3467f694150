//! Bridge orchestrator: the inbound protocol surface.
//!
//! Routes every inbound method through an explicit dispatch table, owns the
//! session registry, and drives the agent instance. Agent failures never
//! escape this layer: the client always receives a well-formed response or
//! error frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bridge::agent::{AgentDeps, AgentInstance, RunOutput};
use crate::bridge::executor::ToolExecutor;
use crate::config::BridgeConfig;
use crate::protocol::message::{
    ClientCapabilities, PromptResponse, RpcError, ServerCapabilities, StopReason,
};
use crate::session::registry::SessionRegistry;
use crate::session::state::{PermissionGrants, Session, SessionLifecycle, SessionState};
use crate::tools::discovery::discover;
use crate::transport::conn::Connection;
use crate::{AppError, Result};

/// Params of `initialize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    client_capabilities: ClientCapabilities,
}

/// Params carrying only a session id (`session/resume`, `session/cancel`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: String,
}

/// Params of `session/prompt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    message: String,
}

/// Orchestrator between the IDE protocol and the agent instance.
pub struct Bridge {
    config: Arc<BridgeConfig>,
    registry: Arc<SessionRegistry>,
    agent: Arc<dyn AgentInstance>,
    /// Capability flags per connection, captured at `initialize`.
    client_caps: Mutex<HashMap<String, ClientCapabilities>>,
    /// Cancellation token of the active run per session.
    runs: Mutex<HashMap<String, CancellationToken>>,
    /// Cancels that arrived before their run registered; consumed at
    /// registration.
    pending_cancels: Mutex<HashSet<String>>,
}

impl Bridge {
    /// Create a bridge around an agent instance.
    #[must_use]
    pub fn new(config: Arc<BridgeConfig>, agent: Arc<dyn AgentInstance>) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            agent,
            client_caps: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            pending_cancels: Mutex::new(HashSet::new()),
        }
    }

    /// The session registry (shared with the sweep task and tests).
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Handle one inbound request frame end to end: dispatch, then write the
    /// response or error back on `conn`.
    pub async fn handle_request(&self, conn: &Arc<Connection>, id: &Value, method: &str, params: Value) {
        let span = info_span!("request", conn = %conn.id(), method);
        async {
            let outcome = self.dispatch(conn, method, params).await;
            let write_result = match outcome {
                Ok(result) => conn.send_response(id, &result).await,
                Err(err) => {
                    debug!(error = %err, "request failed");
                    let rpc = match &err {
                        AppError::Protocol(msg) if msg.starts_with("unknown method") => {
                            RpcError::method_not_found(method)
                        }
                        other => RpcError::from_app(other),
                    };
                    conn.send_error(id, &rpc).await
                }
            };
            if let Err(err) = write_result {
                warn!(error = %err, "could not write response frame");
            }
        }
        .instrument(span)
        .await;
    }

    /// Handle one inbound notification frame.
    pub async fn handle_notification(&self, conn: &Arc<Connection>, method: &str, params: Value) {
        match method {
            "session/cancel" => match serde_json::from_value::<SessionParams>(params) {
                Ok(p) => self.cancel(&p.session_id).await,
                Err(err) => warn!(conn = %conn.id(), error = %err, "bad session/cancel params"),
            },
            other => {
                debug!(conn = %conn.id(), method = other, "skipping unknown notification");
            }
        }
    }

    /// Tell the bridge a transport connection is gone.
    ///
    /// Sessions it owned enter the disconnect grace window instead of being
    /// evicted outright, so a prompt reconnect can resume them.
    pub async fn connection_closed(&self, connection_id: &str) {
        self.client_caps.lock().await.remove(connection_id);
        self.registry.mark_disconnected(connection_id).await;
        info!(conn = connection_id, "connection closed, sessions in grace window");
    }

    // ── Dispatch table ────────────────────────────────────────────────────────

    /// Explicit method dispatch. No reflection: every method the bridge
    /// understands is named here.
    async fn dispatch(&self, conn: &Arc<Connection>, method: &str, params: Value) -> Result<Value> {
        match method {
            "initialize" => self.initialize(conn, params).await,
            "session/new" => self.new_session(conn).await,
            "session/resume" => self.resume_session(conn, params).await,
            "session/prompt" => self.prompt(conn, params).await,
            "session/cancel" => {
                let p: SessionParams = parse_params(params)?;
                self.cancel(&p.session_id).await;
                Ok(Value::Null)
            }
            other => Err(AppError::Protocol(format!("unknown method: {other}"))),
        }
    }

    // ── Method handlers ───────────────────────────────────────────────────────

    /// `initialize`: record client capabilities, report ours.
    async fn initialize(&self, conn: &Arc<Connection>, params: Value) -> Result<Value> {
        let p: InitializeParams = parse_params(params)?;
        debug!(caps = ?p.client_capabilities, "client initialized");
        self.client_caps
            .lock()
            .await
            .insert(conn.id().to_owned(), p.client_capabilities);

        serde_json::to_value(ServerCapabilities::default())
            .map_err(|e| AppError::Protocol(format!("serialising capabilities: {e}")))
    }

    /// `session/new`: run discovery eagerly and register a fresh session.
    async fn new_session(&self, conn: &Arc<Connection>) -> Result<Value> {
        let caps = self.caps_for(conn.id()).await;
        let session_id = Uuid::new_v4().to_string();

        let state = self.discover_state(conn, &caps).await;
        let meta = Session::new(session_id.clone(), conn.id().to_owned(), caps);
        self.registry.register(meta, state).await;

        info!(session_id = %session_id, "session created");
        Ok(json!({ "sessionId": session_id }))
    }

    /// `session/resume`: transfer a registered session to this connection.
    ///
    /// The whole transfer happens inside the resume guard so the idle sweep
    /// cannot evict the session mid-transfer.
    async fn resume_session(&self, conn: &Arc<Connection>, params: Value) -> Result<Value> {
        let p: SessionParams = parse_params(params)?;

        let _guard = self.registry.begin_resume(&p.session_id);
        self.registry.transfer(&p.session_id, conn.id()).await?;

        info!(session_id = %p.session_id, conn = %conn.id(), "session resumed");
        Ok(json!({ "sessionId": p.session_id, "resumed": true }))
    }

    /// `session/prompt`: the main turn loop.
    async fn prompt(&self, conn: &Arc<Connection>, params: Value) -> Result<Value> {
        let p: PromptParams = parse_params(params)?;
        let session_id = p.session_id.clone();
        let span = info_span!("prompt", session_id = %session_id);

        async {
            // Resolve state, creating it lazily for callers that skipped
            // session/new (backward-compatible path).
            let state = match self.registry.get(&session_id).await {
                Some(state) => state,
                None => {
                    let caps = self.caps_for(conn.id()).await;
                    let state = self.discover_state(conn, &caps).await;
                    let meta = Session::new(session_id.clone(), conn.id().to_owned(), caps);
                    self.registry.register(meta, Arc::clone(&state)).await;
                    info!(session_id = %session_id, "session registered lazily on prompt");
                    state
                }
            };

            self.registry.touch(&session_id).await;

            // One run at a time per session.
            let cancel = CancellationToken::new();
            {
                let mut runs = self.runs.lock().await;
                if runs.contains_key(&session_id) {
                    return Err(AppError::Session(format!(
                        "session {session_id} already has an active prompt"
                    )));
                }
                runs.insert(session_id.clone(), cancel.clone());
            }
            // A cancel notification can race ahead of this registration; it
            // parks the session id and is honoured here.
            if self.pending_cancels.lock().await.remove(&session_id) {
                info!(session_id = %session_id, "applying cancel that raced ahead of registration");
                cancel.cancel();
            }
            self.registry
                .set_lifecycle(&session_id, SessionLifecycle::Active)
                .await;

            let grants = match self.registry.meta(&session_id).await {
                Some(meta) => meta.grants,
                None => PermissionGrants::default(),
            };
            let executor = Arc::new(ToolExecutor::new(
                Arc::clone(conn),
                session_id.clone(),
                Arc::clone(&state),
                grants,
                self.config.permission_timeout(),
                self.config.request_timeout(),
                cancel.clone(),
            ));

            let deps = AgentDeps {
                connection: Arc::clone(conn),
                session_id: session_id.clone(),
                tools: Arc::clone(&executor),
            };

            let run_result = state.agent.run(p.message.clone(), deps).await;

            // The run slot is freed on every path.
            self.runs.lock().await.remove(&session_id);

            let response = self
                .conclude_run(conn, &session_id, run_result, &cancel)
                .await;

            serde_json::to_value(response)
                .map_err(|e| AppError::Protocol(format!("serialising prompt response: {e}")))
        }
        .instrument(span)
        .await
    }

    /// `session/cancel`: flag the active run; it observes the token at its
    /// next suspension point and unwinds.
    async fn cancel(&self, session_id: &str) {
        let token = self.runs.lock().await.get(session_id).cloned();
        match token {
            Some(token) => {
                info!(session_id, "cancelling active run");
                token.cancel();
                self.registry
                    .set_lifecycle(session_id, SessionLifecycle::Cancelled)
                    .await;
            }
            None => {
                debug!(session_id, "cancel arrived before any run registered, parking it");
                self.pending_cancels
                    .lock()
                    .await
                    .insert(session_id.to_owned());
            }
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Convert the run result into the graceful terminal response. Agent
    /// failures become a stop reason plus a best-effort notification — they
    /// never propagate to the transport loop.
    async fn conclude_run(
        &self,
        conn: &Arc<Connection>,
        session_id: &str,
        run_result: Result<RunOutput>,
        cancel: &CancellationToken,
    ) -> PromptResponse {
        let stop_reason = match run_result {
            Ok(output) => {
                if cancel.is_cancelled() {
                    StopReason::Cancelled
                } else {
                    output.stop_reason
                }
            }
            Err(AppError::Cancelled(_)) => StopReason::Cancelled,
            Err(AppError::UsageLimit(msg)) => {
                warn!(session_id, %msg, "agent hit its usage limit");
                self.notify_text(conn, session_id, &format!("The agent stopped: {msg}"))
                    .await;
                StopReason::UsageLimit
            }
            Err(err) => {
                warn!(session_id, error = %err, "agent run failed");
                self.notify_text(
                    conn,
                    session_id,
                    &format!("The agent run failed and was stopped: {err}"),
                )
                .await;
                StopReason::Failed
            }
        };

        if stop_reason == StopReason::Cancelled {
            self.registry
                .set_lifecycle(session_id, SessionLifecycle::Cancelled)
                .await;
        }

        PromptResponse { stop_reason }
    }

    /// Best-effort text notification toward the client.
    async fn notify_text(&self, conn: &Arc<Connection>, session_id: &str, text: &str) {
        let params = json!({
            "sessionId": session_id,
            "update": {
                "sessionUpdate": "agent_message_chunk",
                "text": text,
            },
        });
        if let Err(err) = conn.send_notification("session/update", &params).await {
            debug!(session_id, error = %err, "failure notification not delivered");
        }
    }

    /// Capability flags declared by a connection, defaulting to none.
    async fn caps_for(&self, connection_id: &str) -> ClientCapabilities {
        self.client_caps
            .lock()
            .await
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Run discovery and freeze the result into a new session state.
    async fn discover_state(
        &self,
        conn: &Arc<Connection>,
        caps: &ClientCapabilities,
    ) -> Arc<SessionState> {
        let (catalog, tier) = discover(conn, caps, self.config.request_timeout()).await;
        Arc::new(SessionState::new(catalog, Arc::clone(&self.agent), tier))
    }
}

/// Deserialize params, mapping failures to invalid-params protocol errors.
fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| AppError::Protocol(format!("invalid params: {e}")))
}

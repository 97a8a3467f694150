//! Shared helpers: an in-memory client driving the bridge over a duplex
//! stream, plus scripted agent instances.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use agent_bridge::bridge::agent::{AgentDeps, AgentInstance, RunOutput};
use agent_bridge::bridge::executor::ToolOutcome;
use agent_bridge::bridge::Bridge;
use agent_bridge::config::{BridgeConfig, SweepConfig, TimeoutConfig};
use agent_bridge::protocol::message::StopReason;
use agent_bridge::transport::stream::run_connection;
use agent_bridge::{AppError, Result};

/// How long the test client waits for any single frame.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a config with short timeouts suitable for tests.
pub fn test_config(request_seconds: u64, permission_seconds: u64) -> Arc<BridgeConfig> {
    Arc::new(BridgeConfig {
        socket_name: "agent-bridge-test".into(),
        timeouts: TimeoutConfig {
            request_seconds,
            permission_seconds,
        },
        sweep: SweepConfig::default(),
    })
}

/// A bridge wired to an in-memory client connection.
pub struct TestHarness {
    pub bridge: Arc<Bridge>,
    pub client: TestClient,
    pub cancel: CancellationToken,
}

/// Start a bridge over a duplex stream and hand back the client end.
pub fn start_bridge(agent: Arc<dyn AgentInstance>, config: Arc<BridgeConfig>) -> TestHarness {
    let bridge = Arc::new(Bridge::new(config, agent));
    let cancel = CancellationToken::new();

    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);

    tokio::spawn(run_connection(
        server_read,
        server_write,
        Arc::clone(&bridge),
        "conn-test".into(),
        cancel.clone(),
    ));

    let (client_read, client_write) = tokio::io::split(client_io);
    TestHarness {
        bridge,
        client: TestClient {
            reader: BufReader::new(client_read),
            writer: client_write,
        },
        cancel,
    }
}

/// Scripted IDE client on the other end of the duplex stream.
pub struct TestClient {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl TestClient {
    /// Write one raw frame.
    pub async fn send(&mut self, frame: Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("client write must succeed");
    }

    /// Send a request frame.
    pub async fn request(&mut self, id: u64, method: &str, params: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await;
    }

    /// Send a notification frame.
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await;
    }

    /// Answer a server-issued request.
    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))
        .await;
    }

    /// Receive the next frame, failing the test after a bounded wait.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .expect("client read must succeed");
        assert!(read > 0, "server closed the stream unexpectedly");
        serde_json::from_str(line.trim()).expect("server frame must be JSON")
    }

    /// Receive frames until one satisfies `pred`, skipping the rest.
    pub async fn recv_until(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..64 {
            let frame = self.recv().await;
            if pred(&frame) {
                return frame;
            }
        }
        panic!("no frame matched the predicate within 64 frames");
    }

    /// Wait for the response to the client request with `id`.
    pub async fn response_for(&mut self, id: u64) -> Value {
        self.recv_until(|v| v["id"] == json!(id) && (v.get("result").is_some() || v.get("error").is_some()))
            .await
    }

    /// Wait for the next server-issued request with `method`; returns
    /// `(id, params)`.
    pub async fn server_request(&mut self, method: &str) -> (Value, Value) {
        let frame = self
            .recv_until(|v| v["method"] == json!(method) && v.get("id").is_some())
            .await;
        (frame["id"].clone(), frame["params"].clone())
    }

    /// Run the common `initialize` + `session/new` preamble; returns the
    /// session id.
    pub async fn open_session(&mut self, capabilities: Value) -> String {
        self.request(1, "initialize", json!({ "clientCapabilities": capabilities }))
            .await;
        let init = self.response_for(1).await;
        assert!(init.get("result").is_some(), "initialize must succeed: {init}");

        self.request(2, "session/new", json!({})).await;
        let created = self.response_for(2).await;
        created["result"]["sessionId"]
            .as_str()
            .expect("session/new must return a session id")
            .to_owned()
    }
}

// ── Scripted agents ───────────────────────────────────────────────────────────

/// Agent that invokes a fixed list of tools and records each outcome.
pub struct ToolAgent {
    /// `(name, target, args)` per invocation, in order.
    pub calls: Vec<(String, String, Value)>,
    /// Rendered outcomes, appended as invocations finish.
    pub outcomes: Arc<Mutex<Vec<String>>>,
}

impl ToolAgent {
    pub fn single(name: &str, target: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: vec![(name.to_owned(), target.to_owned(), json!({}))],
                outcomes: Arc::clone(&outcomes),
            },
            outcomes,
        )
    }
}

impl AgentInstance for ToolAgent {
    fn run(&self, _prompt: String, deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>> {
        Box::pin(async move {
            for (name, target, args) in &self.calls {
                let outcome = deps
                    .tools
                    .invoke(name, target, args.clone(), Vec::new())
                    .await?;
                let rendered = match outcome {
                    ToolOutcome::Success(v) => format!("success:{v}"),
                    ToolOutcome::Denied(reason) => format!("denied:{reason}"),
                    ToolOutcome::Retry(reason) => format!("retry:{reason}"),
                };
                self.outcomes.lock().await.push(rendered);
            }
            Ok(RunOutput {
                stop_reason: StopReason::EndTurn,
            })
        })
    }
}

/// Agent that idles until cancellation reaches it.
pub struct WaitForCancelAgent;

impl AgentInstance for WaitForCancelAgent {
    fn run(&self, _prompt: String, deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>> {
        Box::pin(async move {
            for _ in 0..500 {
                if deps.tools.is_cancelled() {
                    return Err(AppError::Cancelled("observed at suspension point".into()));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(RunOutput {
                stop_reason: StopReason::EndTurn,
            })
        })
    }
}

/// Agent that always fails.
pub struct FailingAgent;

impl AgentInstance for FailingAgent {
    fn run(&self, _prompt: String, _deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>> {
        Box::pin(async { Err(AppError::Agent("synthetic agent failure".into())) })
    }
}

/// Agent that reports an exhausted usage budget.
pub struct UsageLimitAgent;

impl AgentInstance for UsageLimitAgent {
    fn run(&self, _prompt: String, _deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>> {
        Box::pin(async { Err(AppError::UsageLimit("monthly budget exhausted".into())) })
    }
}

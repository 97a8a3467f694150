//! Agent instance boundary.
//!
//! The bridge drives an opaque agent collaborator through this trait. The
//! agent receives the prompt text plus a dependency bundle giving it the
//! owning connection, its session id, and the tool executor; everything it
//! does against the client flows back through those handles.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::bridge::executor::ToolExecutor;
use crate::protocol::message::StopReason;
use crate::transport::conn::Connection;
use crate::Result;

/// Dependency bundle handed to the agent for one run.
pub struct AgentDeps {
    /// Connection to the IDE client that issued the prompt.
    pub connection: Arc<Connection>,
    /// Session the run belongs to.
    pub session_id: String,
    /// Tool executor wrapping every invocation in tracking and permissions.
    pub tools: Arc<ToolExecutor>,
}

/// Outcome of one completed agent run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Why the turn ended.
    pub stop_reason: StopReason,
}

/// Opaque agent collaborator.
///
/// # Errors
///
/// `run` may fail with [`crate::AppError::UsageLimit`] when the model budget
/// is exhausted mid-run, [`crate::AppError::Cancelled`] when it observed
/// cancellation at a suspension point, or any other error for generic agent
/// failure. The bridge catches all of these at its boundary.
pub trait AgentInstance: Send + Sync {
    /// Execute one prompt turn.
    fn run(&self, prompt: String, deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>>;
}

/// Minimal built-in agent: echoes the prompt back as a message chunk.
///
/// Stands in for a real model-backed agent when the binary runs without one
/// configured; also useful as a smoke-test collaborator.
#[derive(Debug, Default)]
pub struct EchoAgent;

impl AgentInstance for EchoAgent {
    fn run(&self, prompt: String, deps: AgentDeps) -> BoxFuture<'_, Result<RunOutput>> {
        Box::pin(async move {
            deps.tools
                .send_text_chunk(&format!("echo: {prompt}"))
                .await;
            Ok(RunOutput {
                stop_reason: StopReason::EndTurn,
            })
        })
    }
}

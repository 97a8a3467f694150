#![forbid(unsafe_code)]

//! `agent-bridge` — session and tool-call bridge between an IDE client and
//! an embedded coding agent, speaking newline-delimited JSON-RPC 2.0 over a
//! byte stream and a local socket.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};

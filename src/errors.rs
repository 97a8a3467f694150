//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Wire-level fault: malformed frame, codec error, write failure.
    Transport(String),
    /// Protocol violation: unknown method, invalid params, bad envelope.
    Protocol(String),
    /// An outbound request did not receive a response in time.
    Timeout(String),
    /// The peer connection closed while requests were outstanding.
    Disconnected(String),
    /// Session lifecycle violation (wrong state for the operation).
    Session(String),
    /// Tool-call lifecycle or execution failure.
    Tool(String),
    /// The operator declined a permission request.
    PermissionDenied(String),
    /// The agent instance failed during a run.
    Agent(String),
    /// The agent instance hit its usage limit mid-run.
    UsageLimit(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// The active run was cancelled.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Disconnected(msg) => write!(f, "disconnected: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Tool(msg) => write!(f, "tool: {msg}"),
            Self::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            Self::Agent(msg) => write!(f, "agent: {msg}"),
            Self::UsageLimit(msg) => write!(f, "usage limit: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

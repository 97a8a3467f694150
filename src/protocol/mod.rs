//! Wire protocol: newline-delimited JSON-RPC 2.0 framing and message types.

pub mod codec;
pub mod message;

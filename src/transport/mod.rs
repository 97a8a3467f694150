//! Transport adapters: request/response correlation over a byte stream and
//! a local socket, sharing one connection core.

pub mod conn;
pub mod socket;
pub mod stream;

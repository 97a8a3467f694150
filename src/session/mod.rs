//! Session ownership: metadata, immutable cached state, and the registry.

pub mod registry;
pub mod state;

//! Tool-call tracking, catalogs, and capability discovery.

pub mod catalog;
pub mod discovery;
pub mod tracker;

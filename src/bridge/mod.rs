//! Bridge orchestration: protocol surface, tool execution, agent boundary.

pub mod agent;
pub mod executor;
pub mod handler;

pub use handler::Bridge;

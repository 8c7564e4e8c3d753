//! Tool registry and built-in tools.

pub mod builtin;
mod registry;

pub use registry::{BoxError, ToolDefinition, ToolError, ToolRegistry, ToolSpec};

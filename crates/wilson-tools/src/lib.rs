//! Tool registry and executor for Wilson.
//!
//! Every tool invocation is mediated: resolve by name, validate
//! arguments, apply the risk/confirmation policy, execute with timing,
//! and append an audit record. Agents see tools only through the
//! [`ToolExecutor`].

pub mod audit;
pub mod builtins;
pub mod executor;
pub mod registry;
pub mod tool;

pub use audit::{AuditLog, AuditRecord};
pub use builtins::builtin_registry;
pub use executor::{ConfirmationHandler, ConfirmationRequest, ToolExecutor};
pub use registry::ToolRegistry;
pub use tool::{
    require_str, ProgressSink, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata,
};

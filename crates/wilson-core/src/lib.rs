//! Shared types for the Wilson orchestration core.
//!
//! Everything that crosses a crate boundary lives here: the managed-task
//! data model, per-attempt execution context, artifacts and notes, the
//! feedback event + producer handle, the tool-call wire type, the error
//! taxonomy, and the configuration schema.

pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod feedback;
pub mod note;
pub mod store;
pub mod task;
pub mod toolcall;

pub use artifact::{Artifact, ArtifactKind};
pub use config::{AuditConfig, ContextConfig, LlmSettings, McpConfig, McpServerConfig, WilsonConfig};
pub use context::{ExecutionError, ExecutionPhase, TaskContext};
pub use error::{WilsonError, WilsonResult};
pub use feedback::{FeedbackEvent, FeedbackSender, FeedbackSeverity, FeedbackType};
pub use note::AgentNote;
pub use store::ContextStore;
pub use task::{Criterion, ManagedTask, ReviewState, TaskStatus, TaskType};
pub use toolcall::ToolCall;

//! The Wilson orchestration core: task queue and manager, feedback bus,
//! and coordinator.
//!
//! Data flow: a delegation enters through the [`Coordinator`], the
//! [`TaskManager`] keeps the persisted queue honest (DoR/DoD, dependency
//! edges, smart retry), agents report structured events through the
//! [`FeedbackBus`], and the manager's reactions to those events —
//! synthesising blocker tasks, clearing warnings, extending error
//! histories — are the authoritative control flow.

pub mod compile;
pub mod coordinator;
pub mod environment;
pub mod feedback;
pub mod manager;
pub mod retry;
pub mod store;

pub use compile::{extract_error_file, parse_compile_errors, CompileDiagnostics};
pub use coordinator::{completion_banner, failure_banner, Coordinator, DEFAULT_MAX_CONCURRENT};
pub use environment::Environment;
pub use feedback::{FeedbackBus, FeedbackHandler};
pub use manager::{
    DependencyNeededHandler, ErrorPatternHandler, SuccessHandler, TaskManager, TaskSpec,
};
pub use retry::{decide, error_patterns, should_retry, RetryAction, DEFAULT_MAX_ATTEMPTS};
pub use store::TaskStore;

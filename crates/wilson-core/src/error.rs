use thiserror::Error;

/// A convenience `Result` alias using [`WilsonError`].
pub type WilsonResult<T> = Result<T, WilsonError>;

/// Top-level error type for the Wilson orchestration core.
///
/// The variants mirror the failure taxonomy the manager's retry policy
/// operates on, not the crate boundaries they originate from.
#[derive(Error, Debug)]
pub enum WilsonError {
    /// Task inputs are inconsistent with the environment (missing target
    /// file in fix-mode, missing project directory, …).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No client registered for the requested purpose and no fallback.
    #[error("No model available for purpose '{0}'")]
    ModelUnavailable(String),

    /// Transport or parse failure while talking to an LLM backend.
    #[error("Generation error: {0}")]
    Generation(String),

    /// The LLM narrated code or results instead of emitting tool calls.
    #[error("Hallucination detected: {0}")]
    Hallucination(String),

    /// The requested tool is not in the registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed validation before execution began.
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// The confirmation handler denied a risky tool invocation.
    #[error("Tool declined: {0}")]
    ToolDeclined(String),

    /// The tool ran and reported a failure.
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Observable postconditions of a task are unmet.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Verification failure specialised to a parsed compile error.
    #[error("Compile error: {0}")]
    Compile(String),

    /// Queue or state-machine violation (e.g. completing a DoD-unmet task).
    #[error("Task error: {0}")]
    Task(String),

    /// A producer could not enqueue a feedback event within the bounded wait.
    #[error("feedback_bus_timeout")]
    FeedbackBusTimeout,

    /// An error from the task/artifact store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from an outbound HTTP request (LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),
}

impl WilsonError {
    /// Stable short identifier for grouping in `ExecutionError` histories.
    ///
    /// The smart-retry policy groups attempts by this string, so it must
    /// not change between releases.
    pub fn error_type(&self) -> &'static str {
        match self {
            WilsonError::Precondition(_) => "precondition_failed",
            WilsonError::ModelUnavailable(_) => "model_unavailable",
            WilsonError::Generation(_) => "generation_error",
            WilsonError::Hallucination(_) => "hallucination",
            WilsonError::ToolNotFound(_) => "tool_not_found",
            WilsonError::ToolValidation(_) => "tool_validation",
            WilsonError::ToolDeclined(_) => "tool_declined",
            WilsonError::ToolExecution(_) => "tool_execution",
            WilsonError::Verification(_) => "verification_failed",
            WilsonError::Compile(_) => "compile_error",
            WilsonError::Task(_) => "task_error",
            WilsonError::FeedbackBusTimeout => "feedback_bus_timeout",
            WilsonError::Store(_) => "store_error",
            WilsonError::Config(_) => "config_error",
            WilsonError::Serialization(_) => "serialization_error",
            WilsonError::Io(_) => "io_error",
            WilsonError::Http(_) => "http_error",
        }
    }

    /// Whether the manager may retry the attempt that produced this error.
    ///
    /// Only `ModelUnavailable` is unconditionally fatal for a task; the
    /// attempt-count and compile-error taxonomy decide the rest.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, WilsonError::ModelUnavailable(_))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the agent execute skeleton an error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Precondition,
    Intent,
    Execution,
    Verification,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionPhase::Precondition => "precondition",
            ExecutionPhase::Intent => "intent",
            ExecutionPhase::Execution => "execution",
            ExecutionPhase::Verification => "verification",
        };
        write!(f, "{s}")
    }
}

/// A single failure recorded against a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub phase: ExecutionPhase,
    /// Stable grouping key, see `WilsonError::error_type`.
    pub error_type: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ExecutionError {
    pub fn new(
        agent: impl Into<String>,
        phase: ExecutionPhase,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent: agent.into(),
            phase,
            error_type: error_type.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Per-attempt scratch record attached to one task.
///
/// Created fresh for the first attempt; `errors`, `warnings` and the
/// attempt counter accumulate across attempts through the manager. The
/// record is dropped when the task reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub project_path: String,
    pub dependency_files: Vec<String>,
    /// Number of attempts that have already finished (0 on the first run).
    pub previous_attempts: u32,
    pub errors: Vec<ExecutionError>,
    /// Non-fatal observations (stale outputs etc.); cleared by a
    /// `success` feedback event.
    pub warnings: Vec<String>,
    pub created_files: Vec<String>,
    pub modified_files: Vec<String>,
}

impl TaskContext {
    pub fn new(project_path: impl Into<String>) -> Self {
        let path = project_path.into();
        Self {
            project_path: if path.is_empty() { ".".to_string() } else { path },
            dependency_files: Vec::new(),
            previous_attempts: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            created_files: Vec::new(),
            modified_files: Vec::new(),
        }
    }

    pub fn record_error(&mut self, error: ExecutionError) {
        self.errors.push(error);
    }

    pub fn record_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    pub fn record_created_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.created_files.contains(&path) {
            self.created_files.push(path);
        }
    }

    pub fn record_modified_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.modified_files.contains(&path) {
            self.modified_files.push(path);
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_project_path() {
        assert_eq!(TaskContext::default().project_path, ".");
        assert_eq!(TaskContext::new("").project_path, ".");
        assert_eq!(TaskContext::new("/tmp/proj").project_path, "/tmp/proj");
    }

    #[test]
    fn test_created_files_deduplicated() {
        let mut ctx = TaskContext::default();
        ctx.record_created_file("fizzbuzz.go");
        ctx.record_created_file("fizzbuzz.go");
        assert_eq!(ctx.created_files.len(), 1);
    }

    #[test]
    fn test_warnings_cleared_independently_of_errors() {
        let mut ctx = TaskContext::default();
        ctx.record_warning("pre-existing test file: user_test.go");
        ctx.record_error(ExecutionError::new(
            "CodeAgent",
            ExecutionPhase::Verification,
            "compile_error",
            "user.go:1:1: syntax error",
        ));
        ctx.clear_warnings();
        assert!(ctx.warnings.is_empty());
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn test_execution_error_suggestion() {
        let err = ExecutionError::new("TestAgent", ExecutionPhase::Precondition, "precondition_failed", "missing source")
            .with_suggestion("create user.go first");
        assert_eq!(err.suggestion.as_deref(), Some("create user.go first"));
        assert_eq!(err.phase, ExecutionPhase::Precondition);
    }
}

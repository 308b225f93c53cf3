//! Smart-retry policy: a pure function of the execution-error history and
//! the attempt counter. Everything here is deterministic and unit-tested;
//! the manager applies the decisions.

use crate::compile::parse_compile_errors;
use wilson_core::{ExecutionError, TaskContext};

/// Default attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors of one type appearing in this many attempts counts as a
/// repeating pattern and escalates instead of looping.
const REPEAT_THRESHOLD: usize = 3;

/// Thresholds separating a *simple* compile error (iterative in-agent
/// fixing) from a *complex* one (escalate to analysis).
const MAX_SIMPLE_FILES: usize = 1;
const MAX_SIMPLE_ERRORS: usize = 5;

/// What the manager should do with a failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Reschedule the task; for compile errors this carries the stderr to
    /// seed fix-mode.
    Retry { fix_compile_error: Option<String> },
    /// Stop looping: block the task and synthesise an analysis subtask.
    Escalate { reason: String },
    /// Leave the task alone — another mechanism (the dependency-needed
    /// feedback path) owns its rescheduling.
    Deferred { reason: String },
    /// Terminal failure.
    Fail { reason: String },
}

/// `ShouldRetry(max) ≡ PreviousAttempts < max`.
pub fn should_retry(previous_attempts: u32, max_attempts: u32) -> bool {
    previous_attempts < max_attempts
}

/// Group the error history into display patterns: `"<type>"` for a single
/// occurrence, `"<type> (xN)"` for N ≥ 2, first-seen order.
pub fn error_patterns(errors: &[ExecutionError]) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    for err in errors {
        if !order.contains(&err.error_type.as_str()) {
            order.push(&err.error_type);
        }
    }
    order
        .into_iter()
        .map(|error_type| {
            let count = errors.iter().filter(|e| e.error_type == error_type).count();
            if count >= 2 {
                format!("{error_type} (x{count})")
            } else {
                error_type.to_string()
            }
        })
        .collect()
}

fn occurrences(errors: &[ExecutionError], error_type: &str) -> usize {
    errors.iter().filter(|e| e.error_type == error_type).count()
}

/// Decide retry vs escalate vs fail for the task whose context this is.
///
/// Call after the failed attempt has been recorded (so
/// `previous_attempts` already counts it).
pub fn decide(ctx: &TaskContext, max_attempts: u32) -> RetryAction {
    let Some(last) = ctx.errors.last() else {
        return RetryAction::Fail {
            reason: "agent failed without a recorded error".to_string(),
        };
    };
    let patterns = error_patterns(&ctx.errors).join(", ");

    if last.error_type == "model_unavailable" {
        return RetryAction::Fail {
            reason: last.message.clone(),
        };
    }

    if !should_retry(ctx.previous_attempts, max_attempts) {
        // Out of attempts. A repeating pattern earns a review subtask;
        // anything else is plain failure.
        return if occurrences(&ctx.errors, &last.error_type) >= REPEAT_THRESHOLD {
            RetryAction::Escalate {
                reason: format!("attempts exhausted with repeating pattern: {patterns}"),
            }
        } else {
            RetryAction::Fail {
                reason: format!("attempts exhausted ({patterns})"),
            }
        };
    }

    match last.error_type.as_str() {
        "compile_error" => {
            let diagnostics = parse_compile_errors(&last.message);
            let repeated = occurrences(&ctx.errors, "compile_error") >= REPEAT_THRESHOLD;
            let simple = diagnostics.affected_file_count() <= MAX_SIMPLE_FILES
                && diagnostics.error_count <= MAX_SIMPLE_ERRORS
                && !repeated;
            if simple {
                RetryAction::Retry {
                    fix_compile_error: Some(last.message.clone()),
                }
            } else {
                RetryAction::Escalate {
                    reason: format!(
                        "complex compile error ({} files, {} errors): {patterns}",
                        diagnostics.affected_file_count(),
                        diagnostics.error_count
                    ),
                }
            }
        }
        "hallucination" => {
            if occurrences(&ctx.errors, "hallucination") >= 2 {
                RetryAction::Fail {
                    reason: format!("repeated hallucination: {patterns}"),
                }
            } else {
                RetryAction::Retry {
                    fix_compile_error: None,
                }
            }
        }
        _ => RetryAction::Retry {
            fix_compile_error: None,
        },
    }
}

//! Post-condition verification, dispatched by agent kind.
//!
//! Verification runs through the tool executor so compile/test runs are
//! audited like any other invocation.

use crate::kind::AgentKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use wilson_core::{ManagedTask, ToolCall, WilsonError, WilsonResult};
use wilson_tools::{ToolContext, ToolExecutor};

/// Check the observable postconditions of a finished attempt.
///
/// Code tasks: every claimed file exists and the project compiles
/// (compile failures keep their parsed stderr so smart retry can assess
/// them). Test tasks additionally run the test suite. Reading variants
/// only require non-empty output.
pub async fn verify_outcome(
    kind: AgentKind,
    task: &ManagedTask,
    created_files: &[String],
    modified_files: &[String],
    output: &str,
    executor: &Arc<ToolExecutor>,
    tool_ctx: &ToolContext,
) -> WilsonResult<()> {
    match kind {
        AgentKind::Code => {
            check_claimed_files(created_files, modified_files, tool_ctx)?;
            if created_files.is_empty() && modified_files.is_empty() {
                return Err(WilsonError::Verification(format!(
                    "task {} produced no created or modified files",
                    task.key
                )));
            }
            compile(executor, tool_ctx, command_args(task, "build_command")).await
        }
        AgentKind::Test => {
            check_claimed_files(created_files, modified_files, tool_ctx)?;
            compile(executor, tool_ctx, command_args(task, "build_command")).await?;
            run_tests(executor, tool_ctx, command_args(task, "test_command")).await
        }
        AgentKind::Chat | AgentKind::Research | AgentKind::Review | AgentKind::Analysis => {
            if output.trim().is_empty() {
                Err(WilsonError::Verification(
                    "agent produced no output".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }
}

fn check_claimed_files(
    created: &[String],
    modified: &[String],
    tool_ctx: &ToolContext,
) -> WilsonResult<()> {
    for file in created.iter().chain(modified.iter()) {
        let path = tool_ctx.workspace.join(Path::new(file));
        if !path.exists() {
            return Err(WilsonError::Verification(format!(
                "claimed file does not exist: {file}"
            )));
        }
    }
    Ok(())
}

/// A task may pin its build/test command through its input (the manager
/// leaves these to the project's defaults otherwise).
fn command_args(task: &ManagedTask, key: &str) -> serde_json::Value {
    match task.input.get(key).and_then(|v| v.as_str()) {
        Some(command) => serde_json::json!({"command": command}),
        None => serde_json::json!({}),
    }
}

async fn compile(
    executor: &Arc<ToolExecutor>,
    tool_ctx: &ToolContext,
    args: serde_json::Value,
) -> WilsonResult<()> {
    debug!("Verifying: compile_project");
    match executor
        .execute(tool_ctx, &ToolCall::new("compile_project", args))
        .await
    {
        Ok(_) => Ok(()),
        Err(WilsonError::Compile(stderr)) => Err(WilsonError::Compile(stderr)),
        Err(other) => Err(WilsonError::Verification(format!(
            "compile check failed to run: {other}"
        ))),
    }
}

async fn run_tests(
    executor: &Arc<ToolExecutor>,
    tool_ctx: &ToolContext,
    args: serde_json::Value,
) -> WilsonResult<()> {
    debug!("Verifying: run_tests");
    executor
        .execute(tool_ctx, &ToolCall::new("run_tests", args))
        .await
        .map(|_| ())
        .map_err(|e| match e {
            WilsonError::Compile(stderr) => WilsonError::Compile(stderr),
            other => WilsonError::Verification(format!("tests failed: {other}")),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wilson_core::TaskType;
    use wilson_tools::{builtin_registry, AuditLog};

    fn executor() -> Arc<ToolExecutor> {
        Arc::new(ToolExecutor::new(
            Arc::new(builtin_registry()),
            Arc::new(AuditLog::disabled()),
        ))
    }

    fn task() -> ManagedTask {
        ManagedTask::new("TASK-001", "t", "d", TaskType::Code)
    }

    #[tokio::test]
    async fn test_missing_claimed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify_outcome(
            AgentKind::Code,
            &task(),
            &["ghost.go".to_string()],
            &[],
            "",
            &executor(),
            &ToolContext::new(dir.path()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WilsonError::Verification(_)));
        assert!(err.to_string().contains("ghost.go"));
    }

    #[tokio::test]
    async fn test_code_task_with_no_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify_outcome(
            AgentKind::Code,
            &task(),
            &[],
            &[],
            "done",
            &executor(),
            &ToolContext::new(dir.path()),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no created or modified files"));
    }

    #[tokio::test]
    async fn test_prose_kinds_need_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        assert!(verify_outcome(AgentKind::Review, &task(), &[], &[], "  ", &executor(), &ctx)
            .await
            .is_err());
        assert!(
            verify_outcome(AgentKind::Review, &task(), &[], &[], "LGTM", &executor(), &ctx)
                .await
                .is_ok()
        );
    }
}

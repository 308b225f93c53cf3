//! Builtin tools: the file/build/lint/search/VCS surface agents drive.

mod compile_project;
mod create_directory;
mod edit_line;
mod generate_code;
mod git_status;
mod lint_project;
mod list_directory;
mod modify_file;
mod read_file;
mod search_text;
mod write_file;

pub use compile_project::CompileProjectTool;
pub use create_directory::CreateDirectoryTool;
pub use edit_line::EditLineTool;
pub use generate_code::GenerateCodeTool;
pub use git_status::GitStatusTool;
pub use lint_project::LintProjectTool;
pub use list_directory::ListDirectoryTool;
pub use modify_file::ModifyFileTool;
pub use read_file::ReadFileTool;
pub use run_tests::RunTestsTool;
pub use search_text::SearchTextTool;
pub use write_file::WriteFileTool;

use crate::registry::ToolRegistry;
use crate::tool::ToolContext;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wilson_core::{WilsonError, WilsonResult};

/// A registry populated with every builtin tool.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new()));
    registry.register(Arc::new(WriteFileTool::new()));
    registry.register(Arc::new(GenerateCodeTool::new()));
    registry.register(Arc::new(ModifyFileTool::new()));
    registry.register(Arc::new(EditLineTool::new()));
    registry.register(Arc::new(ListDirectoryTool::new()));
    registry.register(Arc::new(CreateDirectoryTool::new()));
    registry.register(Arc::new(SearchTextTool::new()));
    registry.register(Arc::new(CompileProjectTool::new()));
    registry.register(Arc::new(RunTestsTool::new()));
    registry.register(Arc::new(LintProjectTool::new()));
    registry.register(Arc::new(GitStatusTool::new()));
    registry
}

#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run a shell command inside the workspace with a timeout, aborting
/// promptly on context cancellation.
pub(crate) async fn run_command(
    ctx: &ToolContext,
    command: &str,
    timeout: Duration,
) -> WilsonResult<CommandOutput> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&ctx.workspace)
        .kill_on_drop(true)
        .output();

    let output = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            return Err(WilsonError::ToolExecution(format!("'{command}' cancelled")));
        }
        result = tokio::time::timeout(timeout, child) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(WilsonError::ToolExecution(format!(
                    "failed to spawn '{command}': {e}"
                )));
            }
            Err(_) => {
                return Err(WilsonError::ToolExecution(format!(
                    "'{command}' timed out after {}s",
                    timeout.as_secs()
                )));
            }
        },
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: truncate(&String::from_utf8_lossy(&output.stdout), 50_000),
        stderr: truncate(&String::from_utf8_lossy(&output.stderr), 10_000),
    })
}

/// Infer the build command from project markers.
pub(crate) fn infer_build_command(workspace: &Path) -> Option<&'static str> {
    if workspace.join("go.mod").exists() {
        Some("go build ./...")
    } else if workspace.join("Cargo.toml").exists() {
        Some("cargo build")
    } else if has_extension(workspace, "go") {
        // Module-less Go files still compile one at a time.
        Some("go build .")
    } else {
        None
    }
}

pub(crate) fn infer_test_command(workspace: &Path) -> Option<&'static str> {
    if workspace.join("go.mod").exists() || has_extension(workspace, "go") {
        Some("go test ./...")
    } else if workspace.join("Cargo.toml").exists() {
        Some("cargo test")
    } else {
        None
    }
}

pub(crate) fn infer_lint_command(workspace: &Path) -> Option<&'static str> {
    if workspace.join("go.mod").exists() || has_extension(workspace, "go") {
        Some("go vet ./...")
    } else if workspace.join("Cargo.toml").exists() {
        Some("cargo clippy --no-deps -- -D warnings")
    } else {
        None
    }
}

fn has_extension(dir: &Path, ext: &str) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|x| x == ext))
        })
        .unwrap_or(false)
}

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated, {} total bytes]", &s[..end], s.len())
}

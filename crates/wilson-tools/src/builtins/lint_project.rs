use crate::builtins::{infer_lint_command, run_command};
use crate::tool::{RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use std::time::Duration;
use wilson_core::{WilsonError, WilsonResult};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct LintProjectTool {
    metadata: ToolMetadata,
}

impl LintProjectTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("lint_project", ToolCategory::Lint, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Lint command override (default inferred from project markers)"}
                    }
                }))
                .with_example(r#"{"tool": "lint_project", "arguments": {}}"#),
        }
    }
}

impl Default for LintProjectTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for LintProjectTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, _args: &serde_json::Value) -> WilsonResult<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(cmd) => cmd.to_string(),
            None => infer_lint_command(&ctx.workspace)
                .ok_or_else(|| {
                    WilsonError::ToolExecution(
                        "no lint command: no go.mod or Cargo.toml found and none supplied"
                            .to_string(),
                    )
                })?
                .to_string(),
        };

        let out = run_command(ctx, &command, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await?;

        // Lint findings are results, not failures — the agent reads them.
        Ok(serde_json::json!({
            "command": command,
            "exit_code": out.exit_code,
            "stdout": out.stdout,
            "stderr": out.stderr,
        })
        .to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_findings_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = LintProjectTool::new();
        let result = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"command": "echo 'main.go:3: unused variable' >&2 && false"}),
            )
            .await
            .unwrap();
        assert!(result.contains("unused variable"));
        assert!(result.contains("\"exit_code\":1"));
    }
}

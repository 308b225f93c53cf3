use crate::builtins::run_command;
use crate::tool::{RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use std::time::Duration;
use wilson_core::{WilsonError, WilsonResult};

pub struct GitStatusTool {
    metadata: ToolMetadata,
}

impl GitStatusTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("git_status", ToolCategory::Vcs, RiskLevel::Safe)
                .with_parameters(serde_json::json!({"type": "object", "properties": {}}))
                .with_example(r#"{"tool": "git_status", "arguments": {}}"#),
        }
    }
}

impl Default for GitStatusTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GitStatusTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, _args: &serde_json::Value) -> WilsonResult<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, _args: &serde_json::Value) -> WilsonResult<String> {
        let out = run_command(ctx, "git status --porcelain", Duration::from_secs(15)).await?;
        if out.exit_code != 0 {
            return Err(WilsonError::ToolExecution(format!(
                "git status failed: {}",
                out.stderr
            )));
        }
        if out.stdout.trim().is_empty() {
            Ok("working tree clean".to_string())
        } else {
            Ok(out.stdout)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outside_repository_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GitStatusTool::new();
        // A bare tempdir is not a git repository.
        let result = tool
            .execute(&ToolContext::new(dir.path()), &serde_json::json!({}))
            .await;
        assert!(result.is_err());
    }
}

use crate::builtins::truncate;
use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use wilson_core::{WilsonError, WilsonResult};

const MAX_READ_SIZE: usize = 256 * 1024;

pub struct ReadFileTool {
    metadata: ToolMetadata,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("read_file", ToolCategory::File, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path, relative to the project"}
                    },
                    "required": ["path"]
                }))
                .with_example(r#"{"tool": "read_file", "arguments": {"path": "user.go"}}"#),
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path").map(|_| ())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let path = ctx.resolve(require_str(args, "path")?)?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            WilsonError::ToolExecution(format!("failed to read '{}': {e}", path.display()))
        })?;
        Ok(truncate(&content, MAX_READ_SIZE))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.go"), "package main\n").unwrap();
        let tool = ReadFileTool::new();
        let content = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "a.go"}),
            )
            .await
            .unwrap();
        assert_eq!(content, "package main\n");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new();
        let err = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "nope.go"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WilsonError::ToolExecution(_)));
    }

    #[test]
    fn test_validate_requires_path() {
        let tool = ReadFileTool::new();
        assert!(tool.validate(&serde_json::json!({})).is_err());
        assert!(tool.validate(&serde_json::json!({"path": "a.go"})).is_ok());
    }
}

use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

const MAX_WRITE_SIZE: usize = 10 * 1024 * 1024;

pub struct WriteFileTool {
    metadata: ToolMetadata,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("write_file", ToolCategory::File, RiskLevel::Moderate)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path, relative to the project"},
                        "content": {"type": "string", "description": "Full file content"},
                        "create_dirs": {"type": "boolean", "description": "Create parent directories (default true)"}
                    },
                    "required": ["path", "content"]
                }))
                .with_example(
                    r#"{"tool": "write_file", "arguments": {"path": "fizzbuzz.go", "content": "package main"}}"#,
                ),
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path")?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WilsonError::ToolValidation("missing required argument 'content'".into()))?;
        if content.len() > MAX_WRITE_SIZE {
            return Err(WilsonError::ToolValidation(format!(
                "content too large: {} bytes (max {MAX_WRITE_SIZE})",
                content.len()
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = require_str(args, "path")?;
        let path = ctx.resolve(rel)?;
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let create_dirs = args
            .get("create_dirs")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        if create_dirs {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    WilsonError::ToolExecution(format!(
                        "failed to create directories for '{rel}': {e}"
                    ))
                })?;
            }
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to write '{rel}': {e}")))?;

        info!(path = %rel, bytes = content.len(), "File written");
        Ok(serde_json::json!({"path": rel, "bytes_written": content.len()}).to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new();
        let result = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "fizzbuzz.go", "content": "package main\n"}),
            )
            .await
            .unwrap();
        assert!(result.contains("fizzbuzz.go"));
        let content = std::fs::read_to_string(dir.path().join("fizzbuzz.go")).unwrap();
        assert_eq!(content, "package main\n");
    }

    #[tokio::test]
    async fn test_write_nested_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new();
        tool.execute(
            &ToolContext::new(dir.path()),
            &serde_json::json!({"path": "pkg/util/helpers.go", "content": "package util\n"}),
        )
        .await
        .unwrap();
        assert!(dir.path().join("pkg/util/helpers.go").exists());
    }

    #[test]
    fn test_validate_rejects_oversize() {
        let tool = WriteFileTool::new();
        let big = "x".repeat(MAX_WRITE_SIZE + 1);
        assert!(tool
            .validate(&serde_json::json!({"path": "a.go", "content": big}))
            .is_err());
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new();
        let err = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "../evil.go", "content": ""}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WilsonError::ToolValidation(_)));
    }
}

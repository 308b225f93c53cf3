use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

pub struct CreateDirectoryTool {
    metadata: ToolMetadata,
}

impl CreateDirectoryTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("create_directory", ToolCategory::File, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Directory to create (with parents)"}
                    },
                    "required": ["path"]
                }))
                .with_example(r#"{"tool": "create_directory", "arguments": {"path": "pkg/util"}}"#),
        }
    }
}

impl Default for CreateDirectoryTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path").map(|_| ())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = require_str(args, "path")?;
        let path = ctx.resolve(rel)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to create '{rel}': {e}")))?;
        info!(path = %rel, "Directory created");
        Ok(serde_json::json!({"path": rel, "created": true}).to_string())
    }
}

use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

/// Writes a brand-new source file. Refuses to overwrite — existing files
/// are changed surgically with `edit_line` or `modify_file`, which is why
/// fix-mode removes this tool from the code agent's whitelist.
pub struct GenerateCodeTool {
    metadata: ToolMetadata,
}

impl GenerateCodeTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("generate_code", ToolCategory::File, RiskLevel::Moderate)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path for the new source file"},
                        "content": {"type": "string", "description": "Complete file content"},
                        "language": {"type": "string", "description": "Language hint, e.g. 'go'"}
                    },
                    "required": ["path", "content"]
                }))
                .with_example(
                    r#"{"tool": "generate_code", "arguments": {"path": "user.go", "content": "package main", "language": "go"}}"#,
                ),
        }
    }
}

impl Default for GenerateCodeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GenerateCodeTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path")?;
        if args.get("content").and_then(|v| v.as_str()).is_none() {
            return Err(WilsonError::ToolValidation(
                "missing required argument 'content'".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = require_str(args, "path")?;
        let path = ctx.resolve(rel)?;
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");

        if path.exists() {
            return Err(WilsonError::ToolExecution(format!(
                "'{rel}' already exists; use edit_line or modify_file instead"
            )));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WilsonError::ToolExecution(format!("failed to create directories for '{rel}': {e}"))
            })?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to write '{rel}': {e}")))?;

        info!(path = %rel, bytes = content.len(), "Source file generated");
        Ok(serde_json::json!({
            "path": rel,
            "bytes_written": content.len(),
            "created": true
        })
        .to_string())
    }
}

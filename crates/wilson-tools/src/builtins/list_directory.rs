use crate::tool::{RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use wilson_core::{WilsonError, WilsonResult};

pub struct ListDirectoryTool {
    metadata: ToolMetadata,
}

impl ListDirectoryTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("list_directory", ToolCategory::File, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Directory path (default: project root)"}
                    }
                }))
                .with_example(r#"{"tool": "list_directory", "arguments": {"path": "."}}"#),
        }
    }
}

impl Default for ListDirectoryTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, _args: &serde_json::Value) -> WilsonResult<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let path = if rel == "." {
            ctx.workspace.clone()
        } else {
            ctx.resolve(rel)?
        };

        let mut entries = tokio::fs::read_dir(&path).await.map_err(|e| {
            WilsonError::ToolExecution(format!("failed to list '{rel}': {e}"))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WilsonError::ToolExecution(e.to_string()))?
        {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

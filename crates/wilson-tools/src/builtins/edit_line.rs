use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

/// Replace a single line (1-based) — the surgical edit fix-mode prefers.
pub struct EditLineTool {
    metadata: ToolMetadata,
}

impl EditLineTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("edit_line", ToolCategory::File, RiskLevel::Moderate)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File to edit"},
                        "line": {"type": "integer", "description": "1-based line number"},
                        "new_line": {"type": "string", "description": "Replacement line (without newline)"}
                    },
                    "required": ["path", "line", "new_line"]
                }))
                .with_example(
                    r#"{"tool": "edit_line", "arguments": {"path": "user.go", "line": 17, "new_line": "import \"fmt\""}}"#,
                ),
        }
    }
}

impl Default for EditLineTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EditLineTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path")?;
        let line = args.get("line").and_then(|v| v.as_u64()).unwrap_or(0);
        if line == 0 {
            return Err(WilsonError::ToolValidation(
                "'line' must be a positive integer".into(),
            ));
        }
        if args.get("new_line").and_then(|v| v.as_str()).is_none() {
            return Err(WilsonError::ToolValidation(
                "missing required argument 'new_line'".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = require_str(args, "path")?;
        let path = ctx.resolve(rel)?;
        let line_no = args.get("line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let new_line = args.get("new_line").and_then(|v| v.as_str()).unwrap_or("");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to read '{rel}': {e}")))?;

        let mut lines: Vec<&str> = content.lines().collect();
        if line_no > lines.len() {
            return Err(WilsonError::ToolExecution(format!(
                "'{rel}' has {} lines, cannot edit line {line_no}",
                lines.len()
            )));
        }

        let old_line = lines[line_no - 1].to_string();
        lines[line_no - 1] = new_line;
        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }

        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to write '{rel}': {e}")))?;

        info!(path = %rel, line = line_no, "Line edited");
        Ok(serde_json::json!({"path": rel, "line": line_no, "old_line": old_line}).to_string())
    }
}

use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

/// Exact-substring find/replace in one file.
pub struct ModifyFileTool {
    metadata: ToolMetadata,
}

impl ModifyFileTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("modify_file", ToolCategory::File, RiskLevel::Moderate)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File to modify"},
                        "find": {"type": "string", "description": "Exact text to find"},
                        "replace": {"type": "string", "description": "Replacement text"}
                    },
                    "required": ["path", "find", "replace"]
                }))
                .with_example(
                    r#"{"tool": "modify_file", "arguments": {"path": "user.go", "find": "fmt.Pritnln", "replace": "fmt.Println"}}"#,
                ),
        }
    }
}

impl Default for ModifyFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ModifyFileTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        require_str(args, "path")?;
        require_str(args, "find")?;
        if args.get("replace").and_then(|v| v.as_str()).is_none() {
            return Err(WilsonError::ToolValidation(
                "missing required argument 'replace'".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let rel = require_str(args, "path")?;
        let path = ctx.resolve(rel)?;
        let find = require_str(args, "find")?;
        let replace = args.get("replace").and_then(|v| v.as_str()).unwrap_or("");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to read '{rel}': {e}")))?;

        let count = content.matches(find).count();
        if count == 0 {
            return Err(WilsonError::ToolExecution(format!(
                "text not found in '{rel}': '{find}'"
            )));
        }

        let updated = content.replace(find, replace);
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| WilsonError::ToolExecution(format!("failed to write '{rel}': {e}")))?;

        info!(path = %rel, replacements = count, "File modified");
        Ok(serde_json::json!({"path": rel, "replacements": count}).to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replaces_all_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.go"), "foo bar foo").unwrap();
        let tool = ModifyFileTool::new();
        let result = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "a.go", "find": "foo", "replace": "baz"}),
            )
            .await
            .unwrap();
        assert!(result.contains("\"replacements\":2"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.go")).unwrap(),
            "baz bar baz"
        );
    }

    #[tokio::test]
    async fn test_missing_text_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.go"), "content").unwrap();
        let tool = ModifyFileTool::new();
        let err = tool
            .execute(
                &ToolContext::new(dir.path()),
                &serde_json::json!({"path": "a.go", "find": "absent", "replace": "x"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_replace_allowed() {
        let tool = ModifyFileTool::new();
        assert!(tool
            .validate(&serde_json::json!({"path": "a.go", "find": "x", "replace": ""}))
            .is_ok());
    }
}

use crate::builtins::{infer_build_command, run_command};
use crate::tool::{RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use wilson_core::{WilsonError, WilsonResult};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;

/// Builds the project. A non-zero exit surfaces the compiler's stderr as a
/// compile error so the verifier and smart-retry can parse it.
pub struct CompileProjectTool {
    metadata: ToolMetadata,
}

impl CompileProjectTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("compile_project", ToolCategory::Build, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Build command override (default inferred from project markers)"},
                        "timeout_secs": {"type": "integer", "description": "Timeout in seconds (default 120, max 600)"}
                    }
                }))
                .with_example(r#"{"tool": "compile_project", "arguments": {}}"#),
        }
    }
}

impl Default for CompileProjectTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CompileProjectTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, _args: &serde_json::Value) -> WilsonResult<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(cmd) => cmd.to_string(),
            None => infer_build_command(&ctx.workspace)
                .ok_or_else(|| {
                    WilsonError::ToolExecution(
                        "no build command: no go.mod or Cargo.toml found and none supplied"
                            .to_string(),
                    )
                })?
                .to_string(),
        };
        let timeout = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        ctx.report_progress(&format!("compiling: {command}"));
        let out = run_command(ctx, &command, Duration::from_secs(timeout)).await?;

        if out.exit_code != 0 {
            return Err(WilsonError::Compile(if out.stderr.is_empty() {
                out.stdout
            } else {
                out.stderr
            }));
        }

        info!(command = %command, "Compile succeeded");
        Ok(serde_json::json!({
            "command": command,
            "exit_code": out.exit_code,
            "stdout": out.stdout,
        })
        .to_string())
    }
}

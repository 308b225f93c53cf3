use crate::tool::{require_str, RiskLevel, Tool, ToolCategory, ToolContext, ToolMetadata};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use wilson_core::{WilsonError, WilsonResult};

const DEFAULT_MAX_RESULTS: usize = 100;
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", "vendor"];

pub struct SearchTextTool {
    metadata: ToolMetadata,
}

impl SearchTextTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new("search_text", ToolCategory::Search, RiskLevel::Safe)
                .with_parameters(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string", "description": "Regular expression to search for"},
                        "path": {"type": "string", "description": "Subdirectory to search (default: project root)"},
                        "max_results": {"type": "integer", "description": "Result cap (default 100)"}
                    },
                    "required": ["pattern"]
                }))
                .with_example(r#"{"tool": "search_text", "arguments": {"pattern": "func main"}}"#),
        }
    }

    fn collect_files(root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(root) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_str()) {
                    Self::collect_files(&path, out);
                }
            } else {
                out.push(path);
            }
        }
    }
}

impl Default for SearchTextTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchTextTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()> {
        let pattern = require_str(args, "pattern")?;
        Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| WilsonError::ToolValidation(format!("invalid pattern: {e}")))
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String> {
        let pattern = Regex::new(require_str(args, "pattern")?)
            .map_err(|e| WilsonError::ToolValidation(format!("invalid pattern: {e}")))?;
        let root = match args.get("path").and_then(|v| v.as_str()) {
            Some(rel) => ctx.resolve(rel)?,
            None => ctx.workspace.clone(),
        };
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map_or(DEFAULT_MAX_RESULTS, |n| n as usize);

        let workspace = ctx.workspace.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            Self::collect_files(&root, &mut files);
            files.sort();

            let mut results = Vec::new();
            'outer: for file in files {
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue; // binary or unreadable
                };
                for (idx, line) in content.lines().enumerate() {
                    if pattern.is_match(line) {
                        let display = file
                            .strip_prefix(&workspace)
                            .unwrap_or(&file)
                            .display()
                            .to_string();
                        results.push(format!("{display}:{}: {}", idx + 1, line.trim_end()));
                        if results.len() >= max_results {
                            break 'outer;
                        }
                    }
                }
            }
            results
        })
        .await
        .map_err(|e| WilsonError::ToolExecution(e.to_string()))?;

        if matches.is_empty() {
            Ok("no matches".to_string())
        } else {
            Ok(matches.join("\n"))
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wilson_core::{WilsonError, WilsonResult};

/// How dangerous a tool is when invoked with attacker-chosen arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Moderate,
    Dangerous,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Dangerous => "dangerous",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    File,
    Build,
    Lint,
    Search,
    Vcs,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolCategory::File => "file",
            ToolCategory::Build => "build",
            ToolCategory::Lint => "lint",
            ToolCategory::Search => "search",
            ToolCategory::Vcs => "vcs",
        };
        write!(f, "{s}")
    }
}

/// Metadata describing a tool's interface and execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub category: ToolCategory,
    pub risk_level: RiskLevel,
    pub requires_confirm: bool,
    /// JSON-schema shaped parameter description, shown to the LLM.
    pub parameters: serde_json::Value,
    pub examples: Vec<String>,
    pub enabled: bool,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, category: ToolCategory, risk_level: RiskLevel) -> Self {
        Self {
            name: name.into(),
            category,
            risk_level,
            requires_confirm: false,
            parameters: serde_json::json!({}),
            examples: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn with_confirm(mut self) -> Self {
        self.requires_confirm = true;
        self
    }
}

/// Sink long-running tools push status strings into.
pub trait ProgressSink: Send + Sync {
    fn report(&self, status: &str);
}

/// Per-invocation context handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    /// Root all relative paths resolve against; tools may not escape it.
    pub workspace: PathBuf,
    pub cancel: CancellationToken,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl ToolContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn report_progress(&self, status: &str) {
        if let Some(sink) = &self.progress {
            sink.report(status);
        }
    }

    /// Resolve a tool-supplied path inside the workspace.
    ///
    /// Rejects `..` traversal and absolute paths that leave the workspace.
    pub fn resolve(&self, path: &str) -> WilsonResult<PathBuf> {
        if path.is_empty() {
            return Err(WilsonError::ToolValidation("empty path".to_string()));
        }
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WilsonError::ToolValidation(format!(
                "path escapes workspace: '{path}'"
            )));
        }
        if candidate.is_absolute() {
            if candidate.starts_with(&self.workspace) {
                Ok(candidate.to_path_buf())
            } else {
                Err(WilsonError::ToolValidation(format!(
                    "absolute path outside workspace: '{path}'"
                )))
            }
        } else {
            Ok(self.workspace.join(candidate))
        }
    }
}

/// Trait every tool implements. Tools are stateless process-wide
/// singletons owned by the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Cheap argument validation, run before any side effect.
    fn validate(&self, args: &serde_json::Value) -> WilsonResult<()>;

    /// Run the tool. The result string is fed back to the LLM.
    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> WilsonResult<String>;
}

/// Shared validation helper: a required, non-empty string argument.
pub fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> WilsonResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WilsonError::ToolValidation(format!("missing required argument '{key}'")))
}

use crate::kind::AgentKind;
use crate::parser;
use crate::prompt;
use crate::verify;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wilson_core::{
    Artifact, ArtifactKind, ContextStore, ExecutionError, ExecutionPhase, FeedbackEvent,
    FeedbackSender, FeedbackSeverity, FeedbackType, ManagedTask, TaskContext, WilsonError,
    WilsonResult,
};
use wilson_llm::{ChatMessage, GenerateRequest, ModelLease};
use wilson_tools::{ToolContext, ToolExecutor};

/// Iteration cap for the LLM → tools → LLM loop.
const MAX_TURNS: usize = 8;
/// Re-asks when a response fails tool-call parsing.
const LLM_PARSE_RETRIES: usize = 3;
/// Per-file cap when injecting dependency sources into the prompt.
const MAX_DEPENDENCY_SOURCE_BYTES: usize = 16 * 1024;

/// Collaborators every agent run needs, wired by the coordinator.
#[derive(Clone)]
pub struct AgentDeps {
    pub executor: Arc<ToolExecutor>,
    pub feedback: FeedbackSender,
    pub store: Arc<dyn ContextStore>,
}

/// What one agent run produced.
///
/// Agents never propagate failures as `Err`: every task-level failure is
/// an outcome with `success=false`, the error kind, and the tools that
/// ran before it — the manager's retry policy needs all three.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub tools_executed: Vec<String>,
    pub created_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub artifact_id: Option<i64>,
    pub model_used: String,
}

impl AgentOutcome {
    fn failed(err: &WilsonError, model_used: String, tools_executed: Vec<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(err.to_string()),
            error_type: Some(err.error_type().to_string()),
            tools_executed,
            created_files: Vec::new(),
            modified_files: Vec::new(),
            artifact_id: None,
            model_used,
        }
    }
}

/// A role-specific worker: a shared base record dispatching on
/// [`AgentKind`]. All variants run the same five-phase execute skeleton.
pub struct Agent {
    pub name: String,
    pub kind: AgentKind,
    pub allowed_tools: Vec<String>,
    pub can_delegate: bool,
}

impl Agent {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            allowed_tools: kind.default_allowed_tools(),
            can_delegate: kind.can_delegate(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn can_handle(&self, task: &ManagedTask) -> bool {
        self.kind.handles(task.task_type)
    }

    /// Run a task: preconditions → intent → execution → verification →
    /// success. See the module tests and the orchestrator integration
    /// tests for the full behaviour matrix.
    pub async fn execute(
        &self,
        task: &ManagedTask,
        ctx: &mut TaskContext,
        lease: &ModelLease,
        deps: &AgentDeps,
        cancel: CancellationToken,
    ) -> AgentOutcome {
        let model_used = lease.model().to_string();
        info!(task = %task.key, agent = %self.name, model = %model_used, "Agent executing");

        // Phase 1: preconditions.
        if let Err(err) = self.check_preconditions(task, ctx, deps).await {
            ctx.record_error(ExecutionError::new(
                &self.name,
                ExecutionPhase::Precondition,
                err.error_type(),
                err.to_string(),
            ));
            return AgentOutcome::failed(&err, model_used, Vec::new());
        }

        // Fix-mode forces surgical edits: no whole-file generation.
        let mut effective_tools = self.allowed_tools.clone();
        if self.kind == AgentKind::Code && task.fix_mode() {
            effective_tools.retain(|t| t != "generate_code");
            debug!(task = %task.key, "fix-mode: generate_code removed from whitelist");
        }

        let tool_ctx = ToolContext::new(&ctx.project_path).with_cancel(cancel);

        // Phase 2: intent.
        let dependency_sources = self.load_dependency_sources(task, ctx).await;
        let metas = deps.executor.registry().descriptors_for(&effective_tools);
        let mut transcript = vec![
            ChatMessage::system(prompt::system_prompt(self.kind, &metas)),
            ChatMessage::user(prompt::user_prompt(task, ctx, &dependency_sources)),
        ];

        let mut tools_executed: Vec<String> = Vec::new();
        let mut created_files: Vec<String> = Vec::new();
        let mut modified_files: Vec<String> = Vec::new();
        let mut rolling_output = String::new();
        let mut final_output = None;

        for turn in 0..MAX_TURNS {
            let require_calls = self.kind.requires_tool_calls() && turn == 0;
            let content = match self
                .validated_generate(lease, &mut transcript, require_calls)
                .await
            {
                Ok(content) => content,
                Err(err) => {
                    ctx.record_error(ExecutionError::new(
                        &self.name,
                        ExecutionPhase::Intent,
                        err.error_type(),
                        err.to_string(),
                    ));
                    return AgentOutcome::failed(&err, model_used, tools_executed);
                }
            };

            let calls = parser::extract_tool_calls(&content);
            if calls.is_empty() {
                final_output = Some(content);
                break;
            }
            transcript.push(ChatMessage::assistant(&content));

            // Phase 3: execution, strictly in LLM-declared order.
            for call in calls {
                if !effective_tools.iter().any(|t| t == &call.name) {
                    let err = WilsonError::ToolValidation(format!(
                        "tool '{}' is not in {}'s whitelist",
                        call.name, self.name
                    ));
                    ctx.record_error(ExecutionError::new(
                        &self.name,
                        ExecutionPhase::Execution,
                        err.error_type(),
                        err.to_string(),
                    ));
                    return AgentOutcome::failed(&err, model_used, tools_executed);
                }

                match deps.executor.execute(&tool_ctx, &call).await {
                    Ok(result) => {
                        tools_executed.push(call.name.clone());
                        track_file_effects(&call.name, &result, ctx, &mut created_files, &mut modified_files);
                        rolling_output.push_str(&format!("[{}] {result}\n", call.name));
                    }
                    Err(err) => {
                        tools_executed.push(call.name.clone());
                        ctx.record_error(
                            ExecutionError::new(
                                &self.name,
                                ExecutionPhase::Execution,
                                err.error_type(),
                                err.to_string(),
                            )
                            .with_suggestion(format!("tool '{}' failed", call.name)),
                        );
                        let mut outcome = AgentOutcome::failed(&err, model_used, tools_executed);
                        outcome.created_files = created_files;
                        outcome.modified_files = modified_files;
                        return outcome;
                    }
                }
            }

            transcript.push(ChatMessage::user(prompt::continuation_prompt(&rolling_output)));
        }

        let final_output = match final_output {
            Some(output) => output,
            None => {
                let err = WilsonError::Generation(format!(
                    "agent did not finish within {MAX_TURNS} iterations"
                ));
                ctx.record_error(ExecutionError::new(
                    &self.name,
                    ExecutionPhase::Execution,
                    err.error_type(),
                    err.to_string(),
                ));
                return AgentOutcome::failed(&err, model_used, tools_executed);
            }
        };

        // Phase 4: verification.
        if let Err(err) = verify::verify_outcome(
            self.kind,
            task,
            &created_files,
            &modified_files,
            &final_output,
            &deps.executor,
            &tool_ctx,
        )
        .await
        {
            ctx.record_error(ExecutionError::new(
                &self.name,
                ExecutionPhase::Verification,
                err.error_type(),
                err.to_string(),
            ));
            let mut outcome = AgentOutcome::failed(&err, model_used, tools_executed);
            outcome.created_files = created_files;
            outcome.modified_files = modified_files;
            outcome.output = final_output;
            return outcome;
        }

        for file in &created_files {
            ctx.record_created_file(file.clone());
        }
        for file in &modified_files {
            ctx.record_modified_file(file.clone());
        }

        // Phase 5: success.
        let artifact_id = self
            .persist_run_summary(task, &model_used, &tools_executed, &created_files, &modified_files, &final_output, deps)
            .await;

        let success_event = FeedbackEvent::new(
            &task.key,
            &self.name,
            FeedbackType::Success,
            FeedbackSeverity::Info,
            format!("{} completed task {}", self.name, task.key),
        );
        if let Err(e) = deps.feedback.send(success_event).await {
            warn!(task = %task.key, error = %e, "Could not send success feedback");
        }

        info!(
            task = %task.key,
            agent = %self.name,
            tools = tools_executed.len(),
            created = created_files.len(),
            "Agent succeeded"
        );

        AgentOutcome {
            success: true,
            output: final_output,
            error: None,
            error_type: None,
            tools_executed,
            created_files,
            modified_files,
            artifact_id,
            model_used,
        }
    }

    /// Phase 1: environment checks. Repairable gaps become
    /// `dependency_needed` feedback; a missing fix-mode target is fatal
    /// for the task and deliberately requests nothing.
    async fn check_preconditions(
        &self,
        task: &ManagedTask,
        ctx: &mut TaskContext,
        deps: &AgentDeps,
    ) -> WilsonResult<()> {
        let project = Path::new(&ctx.project_path);

        if task.fix_mode() {
            let target = task.target_file().ok_or_else(|| {
                WilsonError::Precondition("fix_mode set without target_file".to_string())
            })?;
            if !project.join(&target).exists() {
                return Err(WilsonError::Precondition(format!(
                    "fix-mode target file does not exist: {target}"
                )));
            }
        }

        if !project.exists() {
            let message = format!("Target directory does not exist: {}", ctx.project_path);
            let event = FeedbackEvent::new(
                &task.key,
                &self.name,
                FeedbackType::DependencyNeeded,
                FeedbackSeverity::Critical,
                &message,
            )
            .with_context("path", serde_json::json!(ctx.project_path))
            .with_context("task_type", serde_json::json!("code"))
            .with_suggestion(format!("Create directory {}", ctx.project_path));
            if let Err(e) = deps.feedback.send(event).await {
                warn!(task = %task.key, error = %e, "Could not send dependency feedback");
            }
            return Err(WilsonError::Precondition(message));
        }

        if self.kind == AgentKind::Test {
            for dep in task.dependency_files() {
                if !project.join(&dep).exists() {
                    let message = format!("Dependency source file does not exist: {dep}");
                    let event = FeedbackEvent::new(
                        &task.key,
                        &self.name,
                        FeedbackType::DependencyNeeded,
                        FeedbackSeverity::Critical,
                        &message,
                    )
                    .with_context("path", serde_json::json!(ctx.project_path))
                    .with_context("file", serde_json::json!(dep))
                    .with_context("task_type", serde_json::json!("code"))
                    .with_suggestion(format!("Create {dep} before writing its tests"));
                    if let Err(e) = deps.feedback.send(event).await {
                        warn!(task = %task.key, error = %e, "Could not send dependency feedback");
                    }
                    return Err(WilsonError::Precondition(message));
                }
            }

            // Stale outputs are a warning, never a failure.
            if let Some(target) = task.target_file() {
                if project.join(&target).exists() {
                    ctx.record_warning(format!("pre-existing test file will be replaced: {target}"));
                }
            }
        }

        Ok(())
    }

    /// LLM call with parse validation: re-asks up to [`LLM_PARSE_RETRIES`]
    /// times when the response must contain tool calls but does not.
    async fn validated_generate(
        &self,
        lease: &ModelLease,
        transcript: &mut Vec<ChatMessage>,
        require_calls: bool,
    ) -> WilsonResult<String> {
        let mut last_err = None;

        for attempt in 0..LLM_PARSE_RETRIES {
            let request = GenerateRequest::new(transcript.clone());
            let response = lease.client().generate(request).await.map_err(|e| match e {
                WilsonError::Http(msg) => WilsonError::Generation(msg),
                other => other,
            })?;

            if !require_calls {
                return Ok(response.content);
            }
            match parser::parse_tool_response(&response.content) {
                Ok(_) => return Ok(response.content),
                Err(err) => {
                    warn!(
                        agent = %self.name,
                        attempt = attempt + 1,
                        error = %err,
                        "Response failed tool-call validation, re-asking"
                    );
                    transcript.push(ChatMessage::assistant(&response.content));
                    transcript.push(ChatMessage::user(prompt::reask_prompt()));
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| WilsonError::Generation("empty response".to_string())))
    }

    /// Read declared dependency sources for prompt injection (code and
    /// test tasks only). Missing files were already handled in
    /// preconditions for the test agent; the code agent just skips them.
    async fn load_dependency_sources(
        &self,
        task: &ManagedTask,
        ctx: &TaskContext,
    ) -> Vec<(String, String)> {
        if !matches!(self.kind, AgentKind::Code | AgentKind::Test) {
            return Vec::new();
        }
        let mut files = task.dependency_files();
        for extra in &ctx.dependency_files {
            if !files.contains(extra) {
                files.push(extra.clone());
            }
        }

        let project = Path::new(&ctx.project_path);
        let mut sources = Vec::new();
        for file in files {
            match tokio::fs::read_to_string(project.join(&file)).await {
                Ok(mut content) => {
                    if content.len() > MAX_DEPENDENCY_SOURCE_BYTES {
                        let mut end = MAX_DEPENDENCY_SOURCE_BYTES;
                        while !content.is_char_boundary(end) {
                            end -= 1;
                        }
                        content.truncate(end);
                        content.push_str("\n… [truncated]");
                    }
                    sources.push((file, content));
                }
                Err(e) => {
                    debug!(file = %file, error = %e, "Skipping unreadable dependency source");
                }
            }
        }
        sources
    }

    async fn persist_run_summary(
        &self,
        task: &ManagedTask,
        model_used: &str,
        tools_executed: &[String],
        created_files: &[String],
        modified_files: &[String],
        output: &str,
        deps: &AgentDeps,
    ) -> Option<i64> {
        let mut summary = format!(
            "Task {}: {}\nAgent: {}\nModel: {}\nTools executed: {}\n",
            task.key,
            task.title,
            self.name,
            model_used,
            tools_executed.join(", "),
        );
        if !created_files.is_empty() {
            summary.push_str(&format!("Created files: {}\n", created_files.join(", ")));
        }
        if !modified_files.is_empty() {
            summary.push_str(&format!("Modified files: {}\n", modified_files.join(", ")));
        }
        summary.push_str(&format!("\nOutput:\n{}", truncate(output, 2000)));

        let artifact = Artifact::new(self.artifact_kind(), summary, &task.key, &self.name);
        let artifact_id = match deps.store.save_artifact(&artifact).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(task = %task.key, error = %e, "Could not persist artifact");
                None
            }
        };

        let note =
            wilson_core::AgentNote::broadcast(&self.name, &task.key, self.completion_note());
        if let Err(e) = deps.store.save_note(&note).await {
            warn!(task = %task.key, error = %e, "Could not persist note");
        }

        artifact_id
    }

    fn artifact_kind(&self) -> ArtifactKind {
        match self.kind {
            AgentKind::Code => ArtifactKind::Code,
            AgentKind::Test => ArtifactKind::Test,
            AgentKind::Research => ArtifactKind::Research,
            AgentKind::Review => ArtifactKind::Review,
            AgentKind::Analysis => ArtifactKind::Analysis,
            AgentKind::Chat => ArtifactKind::Report,
        }
    }

    fn completion_note(&self) -> &'static str {
        match self.kind {
            AgentKind::Code => "Ready for testing",
            AgentKind::Test => "Tests written and passing",
            AgentKind::Review => "Review complete",
            AgentKind::Research => "Research findings recorded",
            AgentKind::Analysis => "Analysis recorded",
            AgentKind::Chat => "Request handled",
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated, {} total bytes]", &s[..end], s.len())
}

/// Attribute file effects to the context from a tool result.
///
/// Creation tools report `{"path": …}` JSON; surgical edits count as
/// modifications. This is what downstream dependency tracking keys on.
fn track_file_effects(
    tool: &str,
    result: &str,
    ctx: &mut TaskContext,
    created: &mut Vec<String>,
    modified: &mut Vec<String>,
) {
    let path = serde_json::from_str::<serde_json::Value>(result)
        .ok()
        .and_then(|v| v["path"].as_str().map(str::to_string));
    let Some(path) = path else {
        return;
    };

    match tool {
        "write_file" | "generate_code" => {
            if !created.contains(&path) {
                created.push(path.clone());
            }
            ctx.record_created_file(path);
        }
        "edit_line" | "modify_file" => {
            if !modified.contains(&path) {
                modified.push(path.clone());
            }
            ctx.record_modified_file(path);
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wilson_core::TaskType;

    #[test]
    fn test_agent_defaults() {
        let agent = Agent::new(AgentKind::Code);
        assert_eq!(agent.name, "CodeAgent");
        assert!(agent.allowed_tools.contains(&"generate_code".to_string()));
        assert!(!agent.can_delegate);
        assert!(Agent::new(AgentKind::Chat).can_delegate);
    }

    #[test]
    fn test_can_handle() {
        let agent = Agent::new(AgentKind::Test);
        let test_task = ManagedTask::new("TASK-001", "t", "d", TaskType::Test);
        let code_task = ManagedTask::new("TASK-002", "t", "d", TaskType::Code);
        assert!(agent.can_handle(&test_task));
        assert!(!agent.can_handle(&code_task));
    }

    #[test]
    fn test_track_file_effects() {
        let mut ctx = TaskContext::new(".");
        let mut created = Vec::new();
        let mut modified = Vec::new();

        track_file_effects(
            "write_file",
            r#"{"path": "fizzbuzz.go", "bytes_written": 120}"#,
            &mut ctx,
            &mut created,
            &mut modified,
        );
        track_file_effects(
            "edit_line",
            r#"{"path": "user.go", "line": 17, "old_line": "x"}"#,
            &mut ctx,
            &mut created,
            &mut modified,
        );
        // Non-JSON results are ignored.
        track_file_effects("read_file", "package main", &mut ctx, &mut created, &mut modified);

        assert_eq!(created, vec!["fizzbuzz.go"]);
        assert_eq!(modified, vec!["user.go"]);
        assert_eq!(ctx.created_files, vec!["fizzbuzz.go"]);
    }

    #[test]
    fn test_failed_outcome_carries_taxonomy() {
        let err = WilsonError::Hallucination("prose".to_string());
        let outcome = AgentOutcome::failed(&err, "m".to_string(), vec!["read_file".to_string()]);
        assert!(!outcome.success);
        assert_eq!(outcome.error_type.as_deref(), Some("hallucination"));
        assert_eq!(outcome.tools_executed, vec!["read_file"]);
    }
}

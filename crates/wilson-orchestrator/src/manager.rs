//! The task manager: queue state machine, DoR/DoD stamping, dependency
//! cascade, required-file injection, and the smart-retry policy applied
//! to agent failures. Feedback handlers that mutate tasks live here too.

use crate::compile::extract_error_file;
use crate::feedback::FeedbackHandler;
use crate::retry::{self, RetryAction, DEFAULT_MAX_ATTEMPTS};
use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wilson_agent::AgentOutcome;
use wilson_core::{
    Criterion, ExecutionError, ExecutionPhase, FeedbackEvent, ManagedTask, TaskContext, TaskStatus,
    TaskType, WilsonError, WilsonResult,
};

/// What a caller provides to create a task; the manager fills in the key,
/// criteria, and persistence.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub priority: i64,
    pub input: HashMap<String, serde_json::Value>,
}

impl TaskSpec {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            task_type,
            priority: 0,
            input: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }
}

pub struct TaskManager {
    store: Arc<TaskStore>,
    /// Per-task attempt context; survives across attempts, dropped when
    /// the task goes terminal.
    contexts: Mutex<HashMap<String, TaskContext>>,
    max_attempts: u32,
}

impl TaskManager {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            contexts: Mutex::new(HashMap::new()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub async fn create_task(&self, spec: TaskSpec) -> WilsonResult<ManagedTask> {
        let key = self.store.next_key().await?;
        let mut task = ManagedTask::new(&key, spec.title, spec.description, spec.task_type)
            .with_priority(spec.priority);
        task.input = spec.input;
        stamp_default_criteria(&mut task);
        self.store.insert_task(&task).await?;
        info!(task = %key, task_type = %task.task_type, "Task created");
        Ok(task)
    }

    /// Create a subtask linked to a parent; inherits the parent's project
    /// path unless the spec overrides it, and outranks it so blockers run
    /// first.
    pub async fn create_subtask(
        &self,
        parent_key: &str,
        mut spec: TaskSpec,
    ) -> WilsonResult<ManagedTask> {
        let parent = self
            .store
            .load_task(parent_key)
            .await?
            .ok_or_else(|| WilsonError::Task(format!("no such parent task: {parent_key}")))?;

        if !spec.input.contains_key("project_path") {
            if let Some(path) = parent.input.get("project_path") {
                spec.input.insert("project_path".to_string(), path.clone());
            }
        }
        if spec.priority == 0 {
            spec.priority = parent.priority + 10;
        }

        let key = self.store.next_key().await?;
        let mut task = ManagedTask::new(&key, spec.title, spec.description, spec.task_type)
            .with_priority(spec.priority)
            .with_parent(parent_key);
        task.input = spec.input;
        stamp_default_criteria(&mut task);
        self.store.insert_task(&task).await?;
        info!(task = %key, parent = %parent_key, "Subtask created");
        Ok(task)
    }

    /// Check DoR criteria and dependencies; flip `new`/`blocked` → `ready`
    /// when both hold. Returns whether the task is now ready.
    pub async fn validate_and_mark_ready(&self, key: &str) -> WilsonResult<bool> {
        let mut task = self.load_required(key).await?;
        if task.status.is_terminal() {
            return Ok(false);
        }

        evaluate_ready_criteria(&mut task);
        let done = self.store.done_keys().await?;

        if !task.is_ready(&done) {
            self.store.update_task(&task).await?;
            return Ok(false);
        }

        match task.status {
            TaskStatus::New | TaskStatus::Blocked => {
                task.block_reason = None;
                task.transition(TaskStatus::Ready)?;
                self.store.update_task(&task).await?;
                info!(task = %key, "Task ready");
                Ok(true)
            }
            TaskStatus::Ready | TaskStatus::Assigned => Ok(true),
            _ => Ok(false),
        }
    }

    /// Atomic poll-and-claim for an agent: highest priority, oldest
    /// created, `ready→assigned`.
    pub async fn claim(
        &self,
        agent: &str,
        task_types: &[TaskType],
    ) -> WilsonResult<Option<ManagedTask>> {
        self.store.claim_next(agent, task_types).await
    }

    /// Record current activity without touching the status machine.
    pub async fn update_progress(
        &self,
        key: &str,
        current_action: &str,
        tools_used: &[String],
    ) -> WilsonResult<()> {
        let mut task = self.load_required(key).await?;
        task.metadata
            .insert("current_action".to_string(), serde_json::json!(current_action));
        task.metadata
            .insert("tools_used".to_string(), serde_json::json!(tools_used));
        task.metadata.insert(
            "progress_updated_at".to_string(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );
        self.store.update_task(&task).await
    }

    /// Record which agent/model will run the task (`ready→assigned`).
    pub async fn record_assignment(
        &self,
        key: &str,
        agent: &str,
        model: &str,
        used_fallback: bool,
    ) -> WilsonResult<()> {
        let mut task = self.load_required(key).await?;
        task.assigned_agent = Some(agent.to_string());
        task.metadata
            .insert("model_used".to_string(), serde_json::json!(model));
        task.metadata
            .insert("used_fallback".to_string(), serde_json::json!(used_fallback));
        if task.status == TaskStatus::Ready {
            task.transition(TaskStatus::Assigned)?;
        }
        self.store.update_task(&task).await
    }

    pub async fn start(&self, key: &str) -> WilsonResult<()> {
        let mut task = self.load_required(key).await?;
        task.transition(TaskStatus::InProgress)?;
        task.started_at = Some(Utc::now());
        self.store.update_task(&task).await
    }

    /// Inject file content for fix-mode / compile-error tasks before
    /// dispatch. Fix-mode's target takes precedence over the file named
    /// by the compile error.
    pub async fn load_required_files(&self, task: &mut ManagedTask) -> WilsonResult<()> {
        let project = task.project_path();

        let target = if task.fix_mode() {
            task.target_file()
        } else if let Some(stderr) = task.compile_error() {
            let extracted = extract_error_file(&stderr);
            if let Some(file) = &extracted {
                task.input
                    .insert("target_file".to_string(), serde_json::json!(file));
            }
            extracted
        } else {
            None
        };

        let Some(target) = target else {
            return Ok(());
        };

        match tokio::fs::read_to_string(Path::new(&project).join(&target)).await {
            Ok(content) => {
                task.input
                    .insert("file_content".to_string(), serde_json::json!(content));
                self.store.update_task(task).await?;
                debug!(task = %task.key, file = %target, "Injected file content");
            }
            Err(e) => {
                // The agent's precondition phase owns the failure story.
                warn!(task = %task.key, file = %target, error = %e, "Could not read required file");
            }
        }
        Ok(())
    }

    // -- Attempt contexts --

    /// The attempt context for a task, created on first use.
    pub async fn attempt_context(&self, task: &ManagedTask) -> TaskContext {
        let mut contexts = self.contexts.lock().await;
        let ctx = contexts.entry(task.key.clone()).or_insert_with(|| {
            let mut ctx = TaskContext::new(task.project_path());
            ctx.dependency_files = task.dependency_files();
            ctx
        });
        ctx.project_path = task.project_path();
        ctx.clone()
    }

    /// Write an attempt's mutations back.
    pub async fn absorb_context(&self, key: &str, ctx: TaskContext) {
        self.contexts.lock().await.insert(key.to_string(), ctx);
    }

    pub async fn context_snapshot(&self, key: &str) -> Option<TaskContext> {
        self.contexts.lock().await.get(key).cloned()
    }

    pub async fn clear_warnings(&self, key: &str) {
        if let Some(ctx) = self.contexts.lock().await.get_mut(key) {
            ctx.clear_warnings();
        }
    }

    pub async fn append_error(&self, key: &str, error: ExecutionError) {
        self.contexts
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .record_error(error);
    }

    // -- Terminal transitions --

    /// Complete a task: enforce DoD, stamp timestamps, then re-evaluate
    /// every dependent whose last blocker this was.
    pub async fn complete(&self, key: &str, outcome: &AgentOutcome) -> WilsonResult<ManagedTask> {
        let mut task = self.load_required(key).await?;
        evaluate_done_criteria(&mut task, outcome);
        if !task.dod_met() {
            let unmet: Vec<&str> = task
                .done_criteria
                .iter()
                .filter(|c| !c.met)
                .map(|c| c.description.as_str())
                .collect();
            return Err(WilsonError::Task(format!(
                "cannot complete {key}: DoD unmet ({})",
                unmet.join("; ")
            )));
        }

        task.transition(TaskStatus::Done)?;
        task.completed_at = Some(Utc::now());
        task.result = Some(outcome.output.clone());
        if let Some(artifact_id) = outcome.artifact_id {
            task.artifacts.push(artifact_id);
        }
        self.store.update_task(&task).await?;
        self.contexts.lock().await.remove(key);
        info!(task = %key, "Task done");

        // Ready-recomputation sees this task's final state: the update
        // above committed before the scan below reads.
        for dependent in self.store.dependents_of(key).await? {
            if let Err(e) = self.validate_and_mark_ready(&dependent).await {
                warn!(task = %dependent, error = %e, "Dependent re-evaluation failed");
            }
        }
        Ok(task)
    }

    pub async fn fail(&self, key: &str, reason: &str) -> WilsonResult<()> {
        let mut task = self.load_required(key).await?;
        task.transition(TaskStatus::Failed)?;
        task.completed_at = Some(Utc::now());
        task.result = Some(reason.to_string());
        self.store.update_task(&task).await?;
        self.contexts.lock().await.remove(key);
        info!(task = %key, reason = %reason, "Task failed");
        Ok(())
    }

    pub async fn block(&self, key: &str, reason: &str) -> WilsonResult<()> {
        let mut task = self.load_required(key).await?;
        task.transition(TaskStatus::Blocked)?;
        task.block_reason = Some(reason.to_string());
        self.store.update_task(&task).await?;
        info!(task = %key, reason = %reason, "Task blocked");
        Ok(())
    }

    /// Apply the smart-retry policy to a failed attempt. The attempt is
    /// counted here; the returned action has already been applied to the
    /// task (rescheduled, blocked + analysis subtask, or failed).
    pub async fn handle_failure(
        &self,
        key: &str,
        outcome: &AgentOutcome,
    ) -> WilsonResult<RetryAction> {
        // Precondition failures never loop here. A repairable one raised
        // dependency_needed feedback and the handler will block/unblock
        // the task; the fix-mode-with-missing-file case is fatal.
        if outcome.error_type.as_deref() == Some("precondition_failed") {
            self.contexts
                .lock()
                .await
                .entry(key.to_string())
                .or_default()
                .previous_attempts += 1;
            let reason = outcome.error.clone().unwrap_or_default();
            if reason.contains("fix-mode") {
                self.fail(key, &reason).await?;
                return Ok(RetryAction::Fail { reason });
            }
            return Ok(RetryAction::Deferred { reason });
        }

        {
            let task = self.load_required(key).await?;
            if task.status == TaskStatus::Blocked {
                return Ok(RetryAction::Deferred {
                    reason: task.block_reason.unwrap_or_default(),
                });
            }
        }

        let decision = {
            let mut contexts = self.contexts.lock().await;
            let ctx = contexts.entry(key.to_string()).or_default();
            ctx.previous_attempts += 1;
            if ctx.errors.is_empty() {
                // Outcome-only failure (agent recorded nothing): keep the
                // history coherent for the pattern formatter.
                ctx.record_error(ExecutionError::new(
                    "TaskManager",
                    ExecutionPhase::Execution,
                    outcome.error_type.clone().unwrap_or_else(|| "task_error".to_string()),
                    outcome.error.clone().unwrap_or_else(|| "unknown failure".to_string()),
                ));
            }
            retry::decide(ctx, self.max_attempts)
        };

        match &decision {
            RetryAction::Retry { fix_compile_error } => {
                let mut task = self.load_required(key).await?;
                if let Some(stderr) = fix_compile_error {
                    task.input
                        .insert("fix_mode".to_string(), serde_json::json!(true));
                    task.input
                        .insert("compile_error".to_string(), serde_json::json!(stderr));
                    if task.target_file().is_none() {
                        if let Some(file) = extract_error_file(stderr) {
                            task.input
                                .insert("target_file".to_string(), serde_json::json!(file));
                        }
                    }
                }
                task.assigned_agent = None;
                task.transition(TaskStatus::Ready)?;
                self.store.update_task(&task).await?;
                info!(task = %key, fix_mode = fix_compile_error.is_some(), "Task rescheduled");
            }
            RetryAction::Escalate { reason } => {
                self.block(key, reason).await?;
                let analysis = self
                    .create_subtask(
                        key,
                        TaskSpec::new(
                            format!("Analyze repeated failure of {key}"),
                            format!(
                                "Task {key} keeps failing: {reason}\n\nInvestigate the error \
                                 history and produce a remediation plan."
                            ),
                            TaskType::Analysis,
                        ),
                    )
                    .await?;
                self.store.add_dependency(&analysis.key, key).await?;
                self.validate_and_mark_ready(&analysis.key).await?;
                info!(task = %key, analysis = %analysis.key, "Escalated to analysis");
            }
            RetryAction::Fail { reason } => {
                self.fail(key, reason).await?;
            }
            RetryAction::Deferred { .. } => {}
        }
        Ok(decision)
    }

    async fn load_required(&self, key: &str) -> WilsonResult<ManagedTask> {
        self.store
            .load_task(key)
            .await?
            .ok_or_else(|| WilsonError::Task(format!("no such task: {key}")))
    }
}

/// Canonical DoR/DoD criteria per task type.
fn stamp_default_criteria(task: &mut ManagedTask) {
    task.ready_criteria = match task.task_type {
        TaskType::Code => vec![
            Criterion::new("Target project path is set"),
            Criterion::new("Change to make is described"),
        ],
        TaskType::Test => vec![
            Criterion::new("Task has a description"),
            Criterion::new("Sources under test are identified"),
        ],
        _ => vec![Criterion::new("Task has a description")],
    };
    task.done_criteria = match task.task_type {
        TaskType::Code => vec![
            Criterion::new("Project compiles"),
            Criterion::new("At least one file created or modified"),
        ],
        TaskType::Test => vec![Criterion::new("Tests compile and pass")],
        _ => vec![Criterion::new("Result recorded")],
    };
}

fn evaluate_ready_criteria(task: &mut ManagedTask) {
    let description_present = !task.description.trim().is_empty();
    let project_present = !task.project_path().is_empty();
    let sources_identified =
        !task.dependency_files().is_empty() || task.target_file().is_some() || description_present;

    for criterion in &mut task.ready_criteria {
        criterion.met = match criterion.description.as_str() {
            "Target project path is set" => project_present,
            "Change to make is described" | "Task has a description" => description_present,
            "Sources under test are identified" => sources_identified,
            _ => criterion.met,
        };
    }
}

fn evaluate_done_criteria(task: &mut ManagedTask, outcome: &AgentOutcome) {
    let files_touched = !outcome.created_files.is_empty() || !outcome.modified_files.is_empty();
    for criterion in &mut task.done_criteria {
        criterion.met = match criterion.description.as_str() {
            "Project compiles" | "Tests compile and pass" => outcome.success,
            "At least one file created or modified" => files_touched,
            "Result recorded" => outcome.success && !outcome.output.trim().is_empty(),
            _ => criterion.met,
        };
    }
}

// -- Feedback handlers --

/// `dependency_needed`: synthesise a blocker task, block the originator,
/// and enqueue the new one. Idempotent: an open subtask with the same
/// parent and title short-circuits a replay.
pub struct DependencyNeededHandler {
    manager: Arc<TaskManager>,
}

impl DependencyNeededHandler {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl FeedbackHandler for DependencyNeededHandler {
    async fn handle(&self, event: &FeedbackEvent) -> WilsonResult<()> {
        let task_type = event
            .context_str("task_type")
            .and_then(|s| TaskType::from_str(s).ok())
            .unwrap_or(TaskType::Code);
        let title = event
            .suggestion
            .clone()
            .unwrap_or_else(|| format!("Resolve dependency for {}", event.task_key));

        // Replay safety.
        let existing = self.manager.store().list_tasks().await?;
        if existing.iter().any(|t| {
            t.parent_key.as_deref() == Some(event.task_key.as_str())
                && t.title == title
                && !t.status.is_terminal()
        }) {
            debug!(task = %event.task_key, "Dependency subtask already open");
            return Ok(());
        }

        let mut spec = TaskSpec::new(
            &title,
            format!(
                "{}\n\nRequested by {} while running task {}.",
                event.message, event.agent, event.task_key
            ),
            task_type,
        );

        // A missing directory/file is created from its parent directory.
        if let Some(path) = event.context_str("path") {
            let missing = Path::new(path);
            let base = missing
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| ".".to_string(), |p| p.display().to_string());
            let name = missing
                .file_name()
                .map_or_else(|| path.to_string(), |n| n.to_string_lossy().to_string());
            spec = spec
                .with_input("project_path", serde_json::json!(base))
                .with_input("target_path", serde_json::json!(name));
        }
        if let Some(file) = event.context_str("file") {
            spec = spec.with_input("target_file", serde_json::json!(file));
        }

        let subtask = self.manager.create_subtask(&event.task_key, spec).await?;
        self.manager
            .store()
            .add_dependency(&subtask.key, &event.task_key)
            .await?;
        self.manager.block(&event.task_key, &event.message).await?;
        self.manager.validate_and_mark_ready(&subtask.key).await?;
        info!(
            task = %event.task_key,
            subtask = %subtask.key,
            "Dependency task synthesised"
        );
        Ok(())
    }
}

/// `success`: clear accumulated warnings on the source task.
pub struct SuccessHandler {
    manager: Arc<TaskManager>,
}

impl SuccessHandler {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl FeedbackHandler for SuccessHandler {
    async fn handle(&self, event: &FeedbackEvent) -> WilsonResult<()> {
        self.manager.clear_warnings(&event.task_key).await;
        Ok(())
    }
}

/// `error_pattern`: attach the reported error to the task's history so
/// the smart-retry policy sees it.
pub struct ErrorPatternHandler {
    manager: Arc<TaskManager>,
}

impl ErrorPatternHandler {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl FeedbackHandler for ErrorPatternHandler {
    async fn handle(&self, event: &FeedbackEvent) -> WilsonResult<()> {
        let error_type = event
            .context_str("error_type")
            .unwrap_or("error_pattern")
            .to_string();
        let mut error = ExecutionError::new(
            &event.agent,
            ExecutionPhase::Execution,
            error_type,
            &event.message,
        );
        if let Some(suggestion) = &event.suggestion {
            error = error.with_suggestion(suggestion);
        }
        self.manager.append_error(&event.task_key, error).await;
        Ok(())
    }
}

//! The coordinator: front door for delegation. Resolves a capable agent,
//! enforces the concurrency cap, acquires the model lease, and drives the
//! execute → smart-retry loop. Async delegations run detached so the
//! caller's context never cancels them implicitly.

use crate::manager::TaskManager;
use crate::retry::RetryAction;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wilson_agent::{Agent, AgentDeps, AgentKind, AgentOutcome};
use wilson_core::{ManagedTask, TaskStatus, WilsonError, WilsonResult};
use wilson_llm::ModelManager;

pub const DEFAULT_MAX_CONCURRENT: usize = 2;

pub struct Coordinator {
    agents: RwLock<Vec<Arc<Agent>>>,
    semaphore: Arc<Semaphore>,
    manager: Arc<TaskManager>,
    models: Arc<ModelManager>,
    deps: AgentDeps,
    results: Mutex<HashMap<String, AgentOutcome>>,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl Coordinator {
    pub fn new(
        manager: Arc<TaskManager>,
        models: Arc<ModelManager>,
        deps: AgentDeps,
        max_concurrent: usize,
    ) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            manager,
            models,
            deps,
            results: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register_agent(&self, agent: Agent) {
        info!(agent = %agent.name, kind = %agent.kind, "Registered agent");
        self.agents.write().await.push(Arc::new(agent));
    }

    /// Register one default agent per variant.
    pub async fn register_default_agents(&self) {
        for kind in AgentKind::ALL {
            self.register_agent(Agent::new(kind)).await;
        }
    }

    pub async fn find_capable(&self, task: &ManagedTask) -> Option<Arc<Agent>> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.can_handle(task))
            .cloned()
    }

    pub async fn agent_by_name(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.name == name)
            .cloned()
    }

    /// Synchronous delegation: runs the task (and its retries) to a
    /// settled state before returning. Cancelling the returned future
    /// cancels the work — unlike the async path.
    pub async fn delegate_task(
        &self,
        key: &str,
        agent_name: Option<&str>,
    ) -> WilsonResult<AgentOutcome> {
        self.manager.validate_and_mark_ready(key).await?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| WilsonError::Task("coordinator shut down".to_string()))?;
        self.run_attempts(key, agent_name, CancellationToken::new())
            .await
    }

    /// Asynchronous delegation: persists readiness, then spawns a
    /// detached execution under its own root context and returns the task
    /// id immediately. Stop it explicitly with [`Coordinator::cancel_task`].
    pub async fn delegate_task_async(self: &Arc<Self>, key: &str) -> WilsonResult<String> {
        self.manager.validate_and_mark_ready(key).await?;
        let task = self
            .manager
            .store()
            .load_task(key)
            .await?
            .ok_or_else(|| WilsonError::Task(format!("no such task: {key}")))?;

        let cancel = CancellationToken::new();
        self.active
            .lock()
            .await
            .insert(key.to_string(), cancel.clone());

        let coordinator = self.clone();
        let key = key.to_string();
        let task_id = task.id.to_string();
        tokio::spawn(async move {
            // Slot acquisition is the concurrency cap: at most
            // max_concurrent delegations run between here and drop.
            let permit = match coordinator.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let result = coordinator
                .run_attempts(&key, None, cancel.clone())
                .await;

            match &result {
                Ok(outcome) if outcome.success => {
                    info!("{}", completion_banner(&task, outcome));
                }
                Ok(outcome) => {
                    warn!("{}", failure_banner(&task, outcome.error.as_deref().unwrap_or("unknown")));
                }
                Err(e) => {
                    error!("{}", failure_banner(&task, &e.to_string()));
                }
            }

            coordinator.active.lock().await.remove(&key);
            drop(permit);
        });

        Ok(task_id)
    }

    /// Execute and apply smart retry until the task settles.
    async fn run_attempts(
        &self,
        key: &str,
        agent_name: Option<&str>,
        cancel: CancellationToken,
    ) -> WilsonResult<AgentOutcome> {
        loop {
            let outcome = self.execute_task(key, agent_name, cancel.clone()).await?;
            self.results
                .lock()
                .await
                .insert(key.to_string(), outcome.clone());

            if outcome.success {
                return Ok(outcome);
            }
            if matches!(
                outcome.error_type.as_deref(),
                Some("model_unavailable")
            ) {
                return Ok(outcome);
            }

            let action = self.manager.handle_failure(key, &outcome).await?;
            match action {
                RetryAction::Retry { .. } if !cancel.is_cancelled() => {
                    info!(task = %key, "Retrying task");
                }
                _ => return Ok(outcome),
            }
        }
    }

    /// One attempt: mark in-progress, run the agent, settle the result.
    /// The model lease is scoped to this function — it releases on every
    /// exit path.
    async fn execute_task(
        &self,
        key: &str,
        agent_name: Option<&str>,
        cancel: CancellationToken,
    ) -> WilsonResult<AgentOutcome> {
        let mut task = self
            .manager
            .store()
            .load_task(key)
            .await?
            .ok_or_else(|| WilsonError::Task(format!("no such task: {key}")))?;

        let agent = match agent_name {
            Some(name) => self.agent_by_name(name).await,
            None => self.find_capable(&task).await,
        }
        .ok_or_else(|| {
            WilsonError::Task(format!("no capable agent for task {key} ({})", task.task_type))
        })?;

        let lease = match self.models.acquire(agent.kind.purpose()) {
            Ok(lease) => lease,
            Err(err) => {
                let reason = format!("model_unavailable: {err}");
                self.manager.fail(key, &reason).await?;
                return Ok(AgentOutcome {
                    success: false,
                    output: String::new(),
                    error: Some(reason),
                    error_type: Some("model_unavailable".to_string()),
                    tools_executed: Vec::new(),
                    created_files: Vec::new(),
                    modified_files: Vec::new(),
                    artifact_id: None,
                    model_used: String::new(),
                });
            }
        };

        self.manager
            .record_assignment(key, &agent.name, lease.model(), lease.used_fallback)
            .await?;
        self.manager.load_required_files(&mut task).await?;
        self.manager.start(key).await?;

        let mut ctx = self.manager.attempt_context(&task).await;
        let outcome = agent
            .execute(&task, &mut ctx, &lease, &self.deps, cancel)
            .await;
        self.manager.absorb_context(key, ctx).await;

        if outcome.success {
            self.manager.complete(key, &outcome).await?;
        }
        Ok(outcome)
    }

    /// Signal an async delegation to stop. Returns whether it was active.
    pub async fn cancel_task(&self, key: &str) -> bool {
        match self.active.lock().await.get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    // -- Polling API --

    pub async fn list_tasks(&self) -> WilsonResult<Vec<ManagedTask>> {
        self.manager.store().list_tasks().await
    }

    pub async fn get_active_tasks(&self) -> WilsonResult<Vec<ManagedTask>> {
        let mut active = self
            .manager
            .store()
            .tasks_with_status(TaskStatus::Assigned)
            .await?;
        active.extend(
            self.manager
                .store()
                .tasks_with_status(TaskStatus::InProgress)
                .await?,
        );
        Ok(active)
    }

    pub async fn get_task_status(
        &self,
        key: &str,
    ) -> WilsonResult<(Option<ManagedTask>, Option<AgentOutcome>)> {
        let task = self.manager.store().load_task(key).await?;
        let outcome = self.results.lock().await.get(key).cloned();
        Ok((task, outcome))
    }

    pub async fn get_result(&self, key: &str) -> Option<AgentOutcome> {
        self.results.lock().await.get(key).cloned()
    }

    pub async fn update_task_progress(
        &self,
        key: &str,
        current_action: &str,
        tools_used: &[String],
    ) -> WilsonResult<()> {
        self.manager
            .update_progress(key, current_action, tools_used)
            .await
    }

    pub async fn running_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

fn short_id(task: &ManagedTask) -> String {
    task.id.to_string().chars().take(8).collect()
}

/// `🎉 Background task completed: <shortid>` plus the first 80 chars of
/// output.
pub fn completion_banner(task: &ManagedTask, outcome: &AgentOutcome) -> String {
    let mut preview: String = outcome.output.chars().take(80).collect();
    if outcome.output.chars().count() > 80 {
        preview.push('…');
    }
    format!(
        "🎉 Background task completed: {} — {preview}",
        short_id(task)
    )
}

/// `❌ Background task failed: <shortid> / Type / Agent / Error`.
pub fn failure_banner(task: &ManagedTask, error: &str) -> String {
    format!(
        "❌ Background task failed: {} / {} / {} / {error}",
        short_id(task),
        task.task_type,
        task.assigned_agent.as_deref().unwrap_or("unassigned"),
    )
}

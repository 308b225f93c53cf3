//! End-to-end pipeline tests with a scripted LLM: delegation through the
//! coordinator, agent execution against a real temp workspace, feedback
//! handling, smart retry, and the concurrency cap.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use wilson_agent::AgentDeps;
use wilson_core::{LlmSettings, TaskStatus, TaskType, WilsonResult};
use wilson_llm::{GenerateRequest, GenerateResponse, LlmClient, ModelManager, Purpose};
use wilson_orchestrator::{
    Coordinator, DependencyNeededHandler, ErrorPatternHandler, FeedbackBus, SuccessHandler,
    TaskManager, TaskSpec, TaskStore,
};
use wilson_tools::{builtin_registry, AuditLog, ToolExecutor};

/// LLM stub that replays canned responses in order, then a terminal
/// plain-text reply.
#[derive(Debug)]
struct ScriptedClient {
    model: String,
    responses: tokio::sync::Mutex<VecDeque<String>>,
    delay: Duration,
}

impl ScriptedClient {
    fn new(model: &str, responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            responses: tokio::sync::Mutex::new(responses.into()),
            delay: Duration::ZERO,
        })
    }

    fn slow(model: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            responses: tokio::sync::Mutex::new(VecDeque::new()),
            delay,
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate(&self, _request: GenerateRequest) -> WilsonResult<GenerateResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "All done.".to_string());
        Ok(GenerateResponse {
            content,
            model: self.model.clone(),
            tokens_used: Some(1),
            metadata: HashMap::new(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    store: Arc<TaskStore>,
    manager: Arc<TaskManager>,
    models: Arc<ModelManager>,
    coordinator: Arc<Coordinator>,
    _consumer: tokio::task::JoinHandle<()>,
}

async fn harness(max_concurrent: usize) -> Harness {
    let store = Arc::new(TaskStore::open_in_memory().await.unwrap());
    let manager = Arc::new(TaskManager::new(store.clone()));
    let models = Arc::new(ModelManager::new());
    let executor = Arc::new(ToolExecutor::new(
        Arc::new(builtin_registry()),
        Arc::new(AuditLog::disabled()),
    ));

    let bus = Arc::new(FeedbackBus::new(store.clone()));
    bus.register_handler(
        wilson_core::FeedbackType::DependencyNeeded,
        Arc::new(DependencyNeededHandler::new(manager.clone())),
    )
    .await;
    bus.register_handler(
        wilson_core::FeedbackType::Success,
        Arc::new(SuccessHandler::new(manager.clone())),
    )
    .await;
    bus.register_handler(
        wilson_core::FeedbackType::ErrorPattern,
        Arc::new(ErrorPatternHandler::new(manager.clone())),
    )
    .await;
    let consumer = bus.spawn_consumer();

    let deps = AgentDeps {
        executor,
        feedback: bus.sender(),
        store: store.clone(),
    };
    let coordinator = Arc::new(Coordinator::new(
        manager.clone(),
        models.clone(),
        deps,
        max_concurrent,
    ));
    coordinator.register_default_agents().await;

    Harness {
        store,
        manager,
        models,
        coordinator,
        _consumer: consumer,
    }
}

fn tool_call(tool: &str, arguments: serde_json::Value) -> String {
    serde_json::json!({"tool": tool, "arguments": arguments}).to_string()
}

// -- Scenario: happy path code task --

#[tokio::test]
async fn happy_path_code_task() {
    let h = harness(2).await;
    let project = tempfile::tempdir().unwrap();

    h.models.register_client(
        Purpose::Code,
        ScriptedClient::new(
            "qwen2.5-coder:14b",
            vec![
                tool_call(
                    "write_file",
                    serde_json::json!({
                        "path": "fizzbuzz.go",
                        "content": "package main\n\nfunc main() {}\n"
                    }),
                ),
                "FizzBuzz implemented and compiling.".to_string(),
            ],
        ),
        LlmSettings::new("qwen2.5-coder:14b"),
    );

    let task = h
        .manager
        .create_task(
            TaskSpec::new("Write FizzBuzz", "Write fizzbuzz in Go", TaskType::Code)
                .with_input("project_path", serde_json::json!(project.path().to_str().unwrap()))
                .with_input("target_file", serde_json::json!("fizzbuzz.go"))
                .with_input("build_command", serde_json::json!("true")),
        )
        .await
        .unwrap();

    let outcome = h.coordinator.delegate_task(&task.key, None).await.unwrap();
    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.created_files, vec!["fizzbuzz.go"]);
    assert_eq!(outcome.tools_executed, vec!["write_file"]);
    assert_eq!(outcome.model_used, "qwen2.5-coder:14b");
    assert!(project.path().join("fizzbuzz.go").exists());

    let settled = h.store.load_task(&task.key).await.unwrap().unwrap();
    assert_eq!(settled.status, TaskStatus::Done);
    assert!(settled.completed_at.is_some());
    assert!(settled.result.unwrap().contains("FizzBuzz implemented"));

    // One artifact persisted, one broadcast note left.
    let artifact_id = outcome.artifact_id.expect("artifact persisted");
    let artifact = h.store.load_artifact(artifact_id).await.unwrap().unwrap();
    assert!(artifact.content.contains(&task.key));
    assert!(artifact.content.contains("write_file"));

    let notes = h.store.notes_for(&task.key).await.unwrap();
    assert!(notes.iter().any(|n| n.is_broadcast() && n.message == "Ready for testing"));
}

// -- Scenario: feedback-driven dependency creation --

#[tokio::test]
async fn missing_project_dir_synthesises_dependency_task() {
    let h = harness(2).await;
    let base = tempfile::tempdir().unwrap();
    let missing = base.path().join("proj");
    let missing_str = missing.to_str().unwrap().to_string();

    // The test agent generates with the code purpose; it never gets to
    // the model here, but the lease is acquired before preconditions.
    h.models.register_client(
        Purpose::Code,
        ScriptedClient::new("m", vec![]),
        LlmSettings::new("m"),
    );

    let task = h
        .manager
        .create_task(
            TaskSpec::new("Write tests", "Test the user module", TaskType::Test)
                .with_input("project_path", serde_json::json!(missing_str)),
        )
        .await
        .unwrap();

    let outcome = h.coordinator.delegate_task(&task.key, None).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error_type.as_deref(), Some("precondition_failed"));

    // Wait for the bus consumer to apply the dependency_needed handler.
    let mut blocked = None;
    for _ in 0..200 {
        let t = h.store.load_task(&task.key).await.unwrap().unwrap();
        if t.status == TaskStatus::Blocked {
            blocked = Some(t);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let blocked = blocked.expect("task was never blocked by the dependency handler");
    assert_eq!(
        blocked.block_reason.as_deref(),
        Some(format!("Target directory does not exist: {missing_str}").as_str())
    );

    let tasks = h.store.list_tasks().await.unwrap();
    let subtask = tasks
        .iter()
        .find(|t| t.parent_key.as_deref() == Some(task.key.as_str()))
        .expect("dependency subtask synthesised");
    assert_eq!(subtask.task_type, TaskType::Code);
    assert_eq!(subtask.title, format!("Create directory {missing_str}"));
    assert_eq!(subtask.status, TaskStatus::Ready);
    assert!(blocked.depends_on.contains(&subtask.key));

    // The event itself was persisted with its context.
    let event = h.store.load_feedback(1).await.unwrap().unwrap();
    assert_eq!(event.feedback_type, wilson_core::FeedbackType::DependencyNeeded);
    assert_eq!(event.severity, wilson_core::FeedbackSeverity::Critical);
    assert_eq!(event.context_str("path"), Some(missing_str.as_str()));
}

// -- Scenario: fix-mode rejects generate_code, then fixes surgically --

#[tokio::test]
async fn fix_mode_restricts_whitelist_then_succeeds() {
    let h = harness(2).await;
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("user.go"), "packag main\n").unwrap();

    h.models.register_client(
        Purpose::Code,
        ScriptedClient::new(
            "m",
            vec![
                // Attempt 1: the model tries whole-file generation, which
                // fix-mode has removed from the whitelist.
                tool_call(
                    "generate_code",
                    serde_json::json!({"path": "user.go", "content": "package main\n"}),
                ),
                // Attempt 2 (after smart retry): surgical edit.
                tool_call(
                    "edit_line",
                    serde_json::json!({"path": "user.go", "line": 1, "new_line": "package main"}),
                ),
                "Fixed the typo in the package clause.".to_string(),
            ],
        ),
        LlmSettings::new("m"),
    );

    let task = h
        .manager
        .create_task(
            TaskSpec::new("Fix package clause", "Fix the compile error", TaskType::Code)
                .with_input("project_path", serde_json::json!(project.path().to_str().unwrap()))
                .with_input("fix_mode", serde_json::json!(true))
                .with_input("target_file", serde_json::json!("user.go"))
                .with_input("compile_error", serde_json::json!("user.go:1:1: expected 'package'"))
                .with_input("build_command", serde_json::json!("true")),
        )
        .await
        .unwrap();

    let outcome = h.coordinator.delegate_task(&task.key, None).await.unwrap();
    assert!(outcome.success, "outcome: {:?}", outcome.error);
    // Only surgical tools ran; the generate_code attempt was rejected
    // before execution.
    assert_eq!(outcome.tools_executed, vec!["edit_line"]);
    assert_eq!(outcome.modified_files, vec!["user.go"]);
    assert_eq!(
        std::fs::read_to_string(project.path().join("user.go")).unwrap(),
        "package main\n"
    );

    let settled = h.store.load_task(&task.key).await.unwrap().unwrap();
    assert_eq!(settled.status, TaskStatus::Done);
}

#[tokio::test]
async fn generate_code_allowed_outside_fix_mode() {
    let h = harness(2).await;
    let project = tempfile::tempdir().unwrap();

    h.models.register_client(
        Purpose::Code,
        ScriptedClient::new(
            "m",
            vec![
                tool_call(
                    "generate_code",
                    serde_json::json!({"path": "user.go", "content": "package main\n"}),
                ),
                "Created user.go.".to_string(),
            ],
        ),
        LlmSettings::new("m"),
    );

    let task = h
        .manager
        .create_task(
            TaskSpec::new("Create user module", "Create user.go", TaskType::Code)
                .with_input("project_path", serde_json::json!(project.path().to_str().unwrap()))
                .with_input("build_command", serde_json::json!("true")),
        )
        .await
        .unwrap();

    let outcome = h.coordinator.delegate_task(&task.key, None).await.unwrap();
    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.tools_executed, vec!["generate_code"]);
}

// -- Scenario: concurrency cap --

#[tokio::test]
async fn concurrency_cap_holds_under_burst() {
    let h = harness(2).await;
    let project = tempfile::tempdir().unwrap();

    h.models.register_client(
        Purpose::Chat,
        ScriptedClient::slow("chat-model", Duration::from_millis(120)),
        LlmSettings::new("chat-model"),
    );

    let mut keys = Vec::new();
    for n in 1..=5 {
        let task = h
            .manager
            .create_task(
                TaskSpec::new(format!("Question {n}"), "Answer a question", TaskType::General)
                    .with_input("project_path", serde_json::json!(project.path().to_str().unwrap())),
            )
            .await
            .unwrap();
        keys.push(task.key.clone());
    }
    for key in &keys {
        h.coordinator.delegate_task_async(key).await.unwrap();
    }

    // Sample while the burst drains: never more than 2 in progress.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let in_progress = h
            .store
            .tasks_with_status(TaskStatus::InProgress)
            .await
            .unwrap()
            .len();
        assert!(in_progress <= 2, "concurrency cap exceeded: {in_progress}");

        let done = h.store.tasks_with_status(TaskStatus::Done).await.unwrap().len();
        if done == keys.len() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tasks never finished; {done}/{} done",
            keys.len()
        );
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    for key in &keys {
        let outcome = h.coordinator.get_result(key).await.expect("result recorded");
        assert!(outcome.success);
    }
    // The active map is cleared just after the terminal transition.
    for _ in 0..100 {
        if h.coordinator.running_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("active delegations never drained");
}

// -- Polling API --

#[tokio::test]
async fn status_polling_reflects_lifecycle() {
    let h = harness(2).await;
    let project = tempfile::tempdir().unwrap();

    h.models.register_client(
        Purpose::Chat,
        ScriptedClient::new("chat-model", vec!["The answer is 42.".to_string()]),
        LlmSettings::new("chat-model"),
    );

    let task = h
        .manager
        .create_task(
            TaskSpec::new("Question", "Answer the question", TaskType::General)
                .with_input("project_path", serde_json::json!(project.path().to_str().unwrap())),
        )
        .await
        .unwrap();

    let (before, outcome_before) = h.coordinator.get_task_status(&task.key).await.unwrap();
    assert_eq!(before.unwrap().status, TaskStatus::New);
    assert!(outcome_before.is_none());

    h.coordinator.delegate_task(&task.key, None).await.unwrap();

    let (after, outcome_after) = h.coordinator.get_task_status(&task.key).await.unwrap();
    assert_eq!(after.unwrap().status, TaskStatus::Done);
    assert!(outcome_after.unwrap().output.contains("42"));
    assert!(h.coordinator.list_tasks().await.unwrap().len() == 1);
}

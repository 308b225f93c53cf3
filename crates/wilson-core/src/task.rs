use crate::error::{WilsonError, WilsonResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Kind of work a task represents. Drives agent selection and the default
/// Definition-of-Ready / Definition-of-Done criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Research,
    Code,
    Test,
    Review,
    Analysis,
    General,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Research => "research",
            TaskType::Code => "code",
            TaskType::Test => "test",
            TaskType::Review => "review",
            TaskType::Analysis => "analysis",
            TaskType::General => "general",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(TaskType::Research),
            "code" => Ok(TaskType::Code),
            "test" => Ok(TaskType::Test),
            "review" => Ok(TaskType::Review),
            "analysis" => Ok(TaskType::Analysis),
            "general" => Ok(TaskType::General),
            other => Err(WilsonError::Task(format!("unknown task type: {other}"))),
        }
    }
}

/// Status of a managed task.
///
/// `Done` and `Failed` are terminal: once entered, a task never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    Ready,
    Assigned,
    InProgress,
    InReview,
    Blocked,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::New => "new",
            TaskStatus::Ready => "ready",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TaskStatus::New),
            "ready" => Ok(TaskStatus::Ready),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "in_review" => Ok(TaskStatus::InReview),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(WilsonError::Task(format!("unknown task status: {other}"))),
        }
    }
}

/// Review verdict attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    Pending,
    Approved,
    NeedsChanges,
    Rejected,
}

/// A single Definition-of-Ready or Definition-of-Done criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub description: String,
    pub met: bool,
}

impl Criterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            met: false,
        }
    }
}

/// A unit of work persisted in the task queue with the full status machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedTask {
    pub id: Uuid,
    /// Stable human key, e.g. `TASK-042`. Monotonic per store.
    pub key: String,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    /// Higher runs first.
    pub priority: i64,
    pub status: TaskStatus,
    /// Keys of tasks that must finish before this one may start.
    pub depends_on: BTreeSet<String>,
    /// Keys of tasks this one blocks (reverse edges, kept for display).
    pub blocks: BTreeSet<String>,
    pub ready_criteria: Vec<Criterion>,
    pub done_criteria: Vec<Criterion>,
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_state: ReviewState,
    pub reviewer: Option<String>,
    pub block_reason: Option<String>,
    /// Free-form inputs: project path, target file, compile error, fix-mode
    /// flag, dependency files, file type, injected file content.
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    pub result: Option<String>,
    /// Ids of artifacts produced by attempts on this task.
    #[serde(default)]
    pub artifacts: Vec<i64>,
    /// Key of the parent task if this is a synthesised subtask.
    pub parent_key: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ManagedTask {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            title: title.into(),
            description: description.into(),
            task_type,
            priority: 0,
            status: TaskStatus::New,
            depends_on: BTreeSet::new(),
            blocks: BTreeSet::new(),
            ready_criteria: Vec::new(),
            done_criteria: Vec::new(),
            assigned_agent: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            review_state: ReviewState::Pending,
            reviewer: None,
            block_reason: None,
            input: HashMap::new(),
            result: None,
            artifacts: Vec::new(),
            parent_key: None,
            metadata: HashMap::new(),
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

    pub fn with_depends_on(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.depends_on.extend(keys);
        self
    }

    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    /// All Definition-of-Ready criteria met (vacuously true when empty).
    pub fn dor_met(&self) -> bool {
        self.ready_criteria.iter().all(|c| c.met)
    }

    /// All Definition-of-Done criteria met (vacuously true when empty).
    pub fn dod_met(&self) -> bool {
        self.done_criteria.iter().all(|c| c.met)
    }

    /// `IsReady ⇔ DoR met ∧ every dependency is done`.
    pub fn is_ready(&self, done_keys: &HashSet<String>) -> bool {
        self.dor_met() && self.depends_on.iter().all(|k| done_keys.contains(k))
    }

    /// `CanStart ⇔ IsReady ∧ not blocked ∧ status ∈ {ready, assigned}`.
    pub fn can_start(&self, done_keys: &HashSet<String>) -> bool {
        self.is_ready(done_keys)
            && self.block_reason.is_none()
            && matches!(self.status, TaskStatus::Ready | TaskStatus::Assigned)
    }

    /// Transition to a new status, enforcing that terminal states are sticky.
    pub fn transition(&mut self, to: TaskStatus) -> WilsonResult<()> {
        if self.status.is_terminal() && to != self.status {
            return Err(WilsonError::Task(format!(
                "task {} is terminal ({}), cannot transition to {}",
                self.key, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    // -- Input accessors --

    pub fn project_path(&self) -> String {
        self.input
            .get("project_path")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(".")
            .to_string()
    }

    pub fn target_file(&self) -> Option<String> {
        self.input
            .get("target_file")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn fix_mode(&self) -> bool {
        self.input
            .get("fix_mode")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn compile_error(&self) -> Option<String> {
        self.input
            .get("compile_error")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn dependency_files(&self) -> Vec<String> {
        self.input
            .get("dependency_files")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file_type(&self) -> Option<String> {
        self.input
            .get("file_type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn file_content(&self) -> Option<String> {
        self.input
            .get("file_content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ManagedTask {
        ManagedTask::new("TASK-001", "Write FizzBuzz", "Implement fizzbuzz", TaskType::Code)
    }

    #[test]
    fn test_new_task_defaults() {
        let t = task();
        assert_eq!(t.status, TaskStatus::New);
        assert_eq!(t.review_state, ReviewState::Pending);
        assert!(t.depends_on.is_empty());
        assert_eq!(t.project_path(), ".");
        assert!(!t.fix_mode());
    }

    #[test]
    fn test_is_ready_requires_dor_and_deps() {
        let mut t = task().with_depends_on(["TASK-000".to_string()]);
        t.ready_criteria.push(Criterion::new("has target path"));

        let mut done = HashSet::new();
        assert!(!t.is_ready(&done));

        t.ready_criteria[0].met = true;
        assert!(!t.is_ready(&done), "dependency still unmet");

        done.insert("TASK-000".to_string());
        assert!(t.is_ready(&done));
    }

    #[test]
    fn test_can_start_excludes_blocked() {
        let mut t = task();
        t.status = TaskStatus::Ready;
        let done = HashSet::new();
        assert!(t.can_start(&done));

        t.block_reason = Some("Target directory does not exist: /tmp/proj".into());
        assert!(!t.can_start(&done));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut t = task();
        t.transition(TaskStatus::Done).unwrap();
        assert!(t.transition(TaskStatus::Ready).is_err());
        assert!(t.transition(TaskStatus::InProgress).is_err());
        // Re-asserting the same terminal state is allowed.
        assert!(t.transition(TaskStatus::Done).is_ok());
    }

    #[test]
    fn test_input_accessors() {
        let t = task()
            .with_input("project_path", serde_json::json!("/tmp/proj"))
            .with_input("target_file", serde_json::json!("user.go"))
            .with_input("fix_mode", serde_json::json!(true))
            .with_input("compile_error", serde_json::json!("user.go:17:10: undefined: fmt"))
            .with_input("dependency_files", serde_json::json!(["a.go", "b.go"]));

        assert_eq!(t.project_path(), "/tmp/proj");
        assert_eq!(t.target_file().as_deref(), Some("user.go"));
        assert!(t.fix_mode());
        assert!(t.compile_error().unwrap().contains("undefined"));
        assert_eq!(t.dependency_files(), vec!["a.go", "b.go"]);
    }

    #[test]
    fn test_dod_vacuous_when_empty() {
        let t = task();
        assert!(t.dod_met());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut t = task().with_priority(5).with_input("file_type", serde_json::json!("go"));
        t.done_criteria.push(Criterion::new("compiles"));
        let json = serde_json::to_string(&t).unwrap();
        let back: ManagedTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, t.key);
        assert_eq!(back.priority, 5);
        assert_eq!(back.task_type, TaskType::Code);
        assert_eq!(back.done_criteria, t.done_criteria);
        assert_eq!(back.file_type().as_deref(), Some("go"));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for s in [
            TaskStatus::New,
            TaskStatus::Ready,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            let parsed: TaskStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}

//! SQLite persistence for tasks, dependencies, reviews, artifacts, notes,
//! and feedback events.
//!
//! One connection behind a mutex; every operation runs the blocking
//! rusqlite work under `spawn_blocking`. Lists and maps are stored as
//! JSON text columns; timestamps are RFC 3339 UTC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use wilson_core::{
    AgentNote, Artifact, ArtifactKind, ContextStore, Criterion, FeedbackEvent, FeedbackSeverity,
    FeedbackType, ManagedTask, ReviewState, TaskStatus, TaskType, WilsonError, WilsonResult,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id                  TEXT NOT NULL,
    key                 TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    task_type           TEXT NOT NULL,
    priority            INTEGER NOT NULL DEFAULT 0,
    status              TEXT NOT NULL,
    assigned_agent      TEXT,
    created_at          TEXT NOT NULL,
    started_at          TEXT,
    completed_at        TEXT,
    review_state        TEXT NOT NULL DEFAULT 'pending',
    reviewer            TEXT,
    block_reason        TEXT,
    input_json          TEXT NOT NULL DEFAULT '{}',
    result              TEXT,
    artifacts_json      TEXT NOT NULL DEFAULT '[]',
    parent_key          TEXT,
    ready_criteria_json TEXT NOT NULL DEFAULT '[]',
    done_criteria_json  TEXT NOT NULL DEFAULT '[]',
    metadata_json       TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS task_dependencies (
    blocker_key TEXT NOT NULL,
    blocked_key TEXT NOT NULL,
    PRIMARY KEY (blocker_key, blocked_key)
);
CREATE TABLE IF NOT EXISTS task_reviews (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    task_key      TEXT NOT NULL,
    reviewer      TEXT NOT NULL,
    status        TEXT NOT NULL,
    findings_json TEXT NOT NULL DEFAULT '[]',
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS artifacts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind       TEXT NOT NULL,
    content    TEXT NOT NULL,
    source     TEXT NOT NULL,
    agent      TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS notes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    from_agent  TEXT NOT NULL,
    to_agent    TEXT,
    context_key TEXT NOT NULL,
    message     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feedback (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    task_key      TEXT NOT NULL,
    agent         TEXT NOT NULL,
    feedback_type TEXT NOT NULL,
    severity      TEXT NOT NULL,
    message       TEXT NOT NULL,
    context_json  TEXT NOT NULL DEFAULT '{}',
    suggestion    TEXT,
    created_at    TEXT NOT NULL,
    processed_at  TEXT
);
CREATE TABLE IF NOT EXISTS task_counter (
    id   INTEGER PRIMARY KEY CHECK (id = 1),
    next INTEGER NOT NULL
);
INSERT OR IGNORE INTO task_counter (id, next) VALUES (1, 1);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
CREATE INDEX IF NOT EXISTS idx_deps_blocked ON task_dependencies (blocked_key);
"#;

/// The relational task store.
#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    pub async fn open(path: impl AsRef<Path>) -> WilsonResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(store_err)?;
            conn.execute_batch(SCHEMA).map_err(store_err)?;
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
            })
        })
        .await
        .map_err(join_err)?
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> WilsonResult<Self> {
        tokio::task::spawn_blocking(|| {
            let conn = Connection::open_in_memory().map_err(store_err)?;
            conn.execute_batch(SCHEMA).map_err(store_err)?;
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
            })
        })
        .await
        .map_err(join_err)?
    }

    async fn with_conn<T, F>(&self, f: F) -> WilsonResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> WilsonResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(join_err)?
    }

    /// Allocate the next monotonic `TASK-<n>` key.
    pub async fn next_key(&self) -> WilsonResult<String> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "UPDATE task_counter SET next = next + 1 WHERE id = 1 RETURNING next - 1",
                    [],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            Ok(format!("TASK-{n:03}"))
        })
        .await
    }

    pub async fn insert_task(&self, task: &ManagedTask) -> WilsonResult<()> {
        let task = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, key, title, description, task_type, priority, status,
                     assigned_agent, created_at, started_at, completed_at, review_state, reviewer,
                     block_reason, input_json, result, artifacts_json, parent_key,
                     ready_criteria_json, done_criteria_json, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)",
                rusqlite::params_from_iter(task_params(&task)?),
            )
            .map_err(store_err)?;
            write_dependencies(conn, &task)?;
            Ok(())
        })
        .await
    }

    pub async fn update_task(&self, task: &ManagedTask) -> WilsonResult<()> {
        let task = task.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE tasks SET id = ?1, title = ?3, description = ?4, task_type = ?5,
                         priority = ?6, status = ?7, assigned_agent = ?8, created_at = ?9,
                         started_at = ?10, completed_at = ?11, review_state = ?12, reviewer = ?13,
                         block_reason = ?14, input_json = ?15, result = ?16, artifacts_json = ?17,
                         parent_key = ?18, ready_criteria_json = ?19, done_criteria_json = ?20,
                         metadata_json = ?21
                     WHERE key = ?2",
                    rusqlite::params_from_iter(task_params(&task)?),
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(WilsonError::Store(format!("no such task: {}", task.key)));
            }
            write_dependencies(conn, &task)?;
            Ok(())
        })
        .await
    }

    pub async fn load_task(&self, key: &str) -> WilsonResult<Option<ManagedTask>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let task = conn
                .query_row("SELECT * FROM tasks WHERE key = ?1", params![key], row_to_task)
                .optional()
                .map_err(store_err)?;
            match task {
                Some(mut task) => {
                    attach_edges(conn, &mut task)?;
                    Ok(Some(task))
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_tasks(&self) -> WilsonResult<Vec<ManagedTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM tasks ORDER BY created_at ASC")
                .map_err(store_err)?;
            let mut tasks = stmt
                .query_map([], row_to_task)
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            for task in &mut tasks {
                attach_edges(conn, task)?;
            }
            Ok(tasks)
        })
        .await
    }

    pub async fn tasks_with_status(&self, status: TaskStatus) -> WilsonResult<Vec<ManagedTask>> {
        let status = status.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM tasks WHERE status = ?1 ORDER BY created_at ASC")
                .map_err(store_err)?;
            let mut tasks = stmt
                .query_map(params![status], row_to_task)
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            for task in &mut tasks {
                attach_edges(conn, task)?;
            }
            Ok(tasks)
        })
        .await
    }

    /// Atomic claim: the highest-priority, oldest `ready` task one of the
    /// given types, flipped `ready→assigned` with the agent recorded.
    pub async fn claim_next(
        &self,
        agent: &str,
        types: &[TaskType],
    ) -> WilsonResult<Option<ManagedTask>> {
        let agent = agent.to_string();
        let types: Vec<String> = types.iter().map(ToString::to_string).collect();
        self.with_conn(move |conn| {
            if types.is_empty() {
                return Ok(None);
            }
            let placeholders = vec!["?"; types.len()].join(", ");
            let sql = format!(
                "SELECT key FROM tasks WHERE status = 'ready' AND task_type IN ({placeholders})
                 ORDER BY priority DESC, created_at ASC LIMIT 1"
            );
            let key: Option<String> = conn
                .query_row(
                    &sql,
                    rusqlite::params_from_iter(types.iter()),
                    |row| row.get(0),
                )
                .optional()
                .map_err(store_err)?;
            let Some(key) = key else {
                return Ok(None);
            };

            // Compare-and-set: only wins if still ready.
            let changed = conn
                .execute(
                    "UPDATE tasks SET status = 'assigned', assigned_agent = ?1
                     WHERE key = ?2 AND status = 'ready'",
                    params![agent, key],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Ok(None);
            }
            let mut task = conn
                .query_row("SELECT * FROM tasks WHERE key = ?1", params![key], row_to_task)
                .map_err(store_err)?;
            attach_edges(conn, &mut task)?;
            Ok(Some(task))
        })
        .await
    }

    /// Keys of all tasks in `done`.
    pub async fn done_keys(&self) -> WilsonResult<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key FROM tasks WHERE status = 'done'")
                .map_err(store_err)?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(store_err)?
                .collect::<Result<HashSet<_>, _>>()
                .map_err(store_err)?;
            Ok(keys)
        })
        .await
    }

    pub async fn add_dependency(&self, blocker_key: &str, blocked_key: &str) -> WilsonResult<()> {
        let blocker = blocker_key.to_string();
        let blocked = blocked_key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (blocker_key, blocked_key) VALUES (?1, ?2)",
                params![blocker, blocked],
            )
            .map_err(store_err)?;
            Ok(())
        })
        .await
    }

    /// Keys of tasks that depend on `blocker_key`.
    pub async fn dependents_of(&self, blocker_key: &str) -> WilsonResult<Vec<String>> {
        let blocker = blocker_key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT blocked_key FROM task_dependencies WHERE blocker_key = ?1")
                .map_err(store_err)?;
            let keys = stmt
                .query_map(params![blocker], |row| row.get::<_, String>(0))
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            Ok(keys)
        })
        .await
    }

    pub async fn add_review(
        &self,
        task_key: &str,
        reviewer: &str,
        status: ReviewState,
        findings: &serde_json::Value,
    ) -> WilsonResult<i64> {
        let task_key = task_key.to_string();
        let reviewer = reviewer.to_string();
        let status = serde_json::to_string(&status)?.trim_matches('"').to_string();
        let findings = findings.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO task_reviews (task_key, reviewer, status, findings_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task_key, reviewer, status, findings, Utc::now().to_rfc3339()],
            )
            .map_err(store_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_artifact(&self, artifact: &Artifact) -> WilsonResult<i64> {
        let artifact = artifact.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO artifacts (kind, content, source, agent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    artifact.kind.to_string(),
                    artifact.content,
                    artifact.source,
                    artifact.agent,
                    artifact.created_at.to_rfc3339()
                ],
            )
            .map_err(store_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn load_artifact(&self, id: i64) -> WilsonResult<Option<Artifact>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, kind, content, source, agent, created_at FROM artifacts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RawArtifact {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        content: row.get(2)?,
                        source: row.get(3)?,
                        agent: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(store_err)?
            .map(RawArtifact::into_artifact)
            .transpose()
        })
        .await
    }

    pub async fn insert_note(&self, note: &AgentNote) -> WilsonResult<i64> {
        let note = note.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO notes (from_agent, to_agent, context_key, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    note.from_agent,
                    note.to_agent,
                    note.context_key,
                    note.message,
                    note.created_at.to_rfc3339()
                ],
            )
            .map_err(store_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn notes_for(&self, context_key: &str) -> WilsonResult<Vec<AgentNote>> {
        let context_key = context_key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, from_agent, to_agent, context_key, message, created_at
                     FROM notes WHERE context_key = ?1 ORDER BY id ASC",
                )
                .map_err(store_err)?;
            let notes = stmt
                .query_map(params![context_key], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            notes
                .into_iter()
                .map(|(id, from_agent, to_agent, context_key, message, created_at)| {
                    Ok(AgentNote {
                        id,
                        from_agent,
                        to_agent,
                        context_key,
                        message,
                        created_at: parse_ts(&created_at)?,
                    })
                })
                .collect()
        })
        .await
    }

    pub async fn insert_feedback(&self, event: &FeedbackEvent) -> WilsonResult<i64> {
        let event = event.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO feedback (task_key, agent, feedback_type, severity, message,
                     context_json, suggestion, created_at, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.task_key,
                    event.agent,
                    event.feedback_type.to_string(),
                    event.severity.to_string(),
                    event.message,
                    serde_json::to_string(&event.context)?,
                    event.suggestion,
                    event.created_at.to_rfc3339(),
                    event.processed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(store_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn mark_feedback_processed(&self, id: i64) -> WilsonResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE feedback SET processed_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(store_err)?;
            Ok(())
        })
        .await
    }

    pub async fn load_feedback(&self, id: i64) -> WilsonResult<Option<FeedbackEvent>> {
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM feedback WHERE id = ?1", params![id], row_to_feedback)
                .optional()
                .map_err(store_err)
        })
        .await?
        .transpose()
    }
}

#[async_trait]
impl ContextStore for TaskStore {
    async fn save_artifact(&self, artifact: &Artifact) -> WilsonResult<i64> {
        self.insert_artifact(artifact).await
    }

    async fn save_note(&self, note: &AgentNote) -> WilsonResult<i64> {
        self.insert_note(note).await
    }
}

// -- Row mapping --

struct RawArtifact {
    id: i64,
    kind: String,
    content: String,
    source: String,
    agent: String,
    created_at: String,
}

impl RawArtifact {
    fn into_artifact(self) -> WilsonResult<Artifact> {
        Ok(Artifact {
            id: self.id,
            kind: ArtifactKind::from_str(&self.kind)?,
            content: self.content,
            source: self.source,
            agent: self.agent,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn task_params(task: &ManagedTask) -> WilsonResult<Vec<Box<dyn rusqlite::types::ToSql>>> {
    Ok(vec![
        Box::new(task.id.to_string()),
        Box::new(task.key.clone()),
        Box::new(task.title.clone()),
        Box::new(task.description.clone()),
        Box::new(task.task_type.to_string()),
        Box::new(task.priority),
        Box::new(task.status.to_string()),
        Box::new(task.assigned_agent.clone()),
        Box::new(task.created_at.to_rfc3339()),
        Box::new(task.started_at.map(|t| t.to_rfc3339())),
        Box::new(task.completed_at.map(|t| t.to_rfc3339())),
        Box::new(
            serde_json::to_string(&task.review_state)?
                .trim_matches('"')
                .to_string(),
        ),
        Box::new(task.reviewer.clone()),
        Box::new(task.block_reason.clone()),
        Box::new(serde_json::to_string(&task.input)?),
        Box::new(task.result.clone()),
        Box::new(serde_json::to_string(&task.artifacts)?),
        Box::new(task.parent_key.clone()),
        Box::new(serde_json::to_string(&task.ready_criteria)?),
        Box::new(serde_json::to_string(&task.done_criteria)?),
        Box::new(serde_json::to_string(&task.metadata)?),
    ])
}

fn write_dependencies(conn: &Connection, task: &ManagedTask) -> WilsonResult<()> {
    conn.execute(
        "DELETE FROM task_dependencies WHERE blocked_key = ?1",
        params![task.key],
    )
    .map_err(store_err)?;
    for blocker in &task.depends_on {
        conn.execute(
            "INSERT OR IGNORE INTO task_dependencies (blocker_key, blocked_key) VALUES (?1, ?2)",
            params![blocker, task.key],
        )
        .map_err(store_err)?;
    }
    Ok(())
}

fn attach_edges(conn: &Connection, task: &mut ManagedTask) -> WilsonResult<()> {
    let mut stmt = conn
        .prepare("SELECT blocker_key FROM task_dependencies WHERE blocked_key = ?1")
        .map_err(store_err)?;
    task.depends_on = stmt
        .query_map(params![task.key], |row| row.get::<_, String>(0))
        .map_err(store_err)?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(store_err)?;

    let mut stmt = conn
        .prepare("SELECT blocked_key FROM task_dependencies WHERE blocker_key = ?1")
        .map_err(store_err)?;
    task.blocks = stmt
        .query_map(params![task.key], |row| row.get::<_, String>(0))
        .map_err(store_err)?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(store_err)?;
    Ok(())
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<ManagedTask> {
    let id: String = row.get("id")?;
    let task_type: String = row.get("task_type")?;
    let status: String = row.get("status")?;
    let review_state: String = row.get("review_state")?;
    let created_at: String = row.get("created_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let input_json: String = row.get("input_json")?;
    let artifacts_json: String = row.get("artifacts_json")?;
    let ready_json: String = row.get("ready_criteria_json")?;
    let done_json: String = row.get("done_criteria_json")?;
    let metadata_json: String = row.get("metadata_json")?;

    let conv = |e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    };

    Ok(ManagedTask {
        id: Uuid::parse_str(&id).map_err(|e| conv(e.to_string()))?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        task_type: TaskType::from_str(&task_type).map_err(|e| conv(e.to_string()))?,
        priority: row.get("priority")?,
        status: TaskStatus::from_str(&status).map_err(|e| conv(e.to_string()))?,
        depends_on: BTreeSet::new(),
        blocks: BTreeSet::new(),
        ready_criteria: serde_json::from_str::<Vec<Criterion>>(&ready_json)
            .map_err(|e| conv(e.to_string()))?,
        done_criteria: serde_json::from_str::<Vec<Criterion>>(&done_json)
            .map_err(|e| conv(e.to_string()))?,
        assigned_agent: row.get("assigned_agent")?,
        created_at: parse_ts_rusqlite(&created_at)?,
        started_at: started_at.as_deref().map(parse_ts_rusqlite).transpose()?,
        completed_at: completed_at.as_deref().map(parse_ts_rusqlite).transpose()?,
        review_state: serde_json::from_str::<ReviewState>(&format!("\"{review_state}\""))
            .map_err(|e| conv(e.to_string()))?,
        reviewer: row.get("reviewer")?,
        block_reason: row.get("block_reason")?,
        input: serde_json::from_str::<HashMap<String, serde_json::Value>>(&input_json)
            .map_err(|e| conv(e.to_string()))?,
        result: row.get("result")?,
        artifacts: serde_json::from_str::<Vec<i64>>(&artifacts_json)
            .map_err(|e| conv(e.to_string()))?,
        parent_key: row.get("parent_key")?,
        metadata: serde_json::from_str::<HashMap<String, serde_json::Value>>(&metadata_json)
            .map_err(|e| conv(e.to_string()))?,
    })
}

fn row_to_feedback(row: &Row<'_>) -> rusqlite::Result<WilsonResult<FeedbackEvent>> {
    let feedback_type: String = row.get("feedback_type")?;
    let severity: String = row.get("severity")?;
    let context_json: String = row.get("context_json")?;
    let created_at: String = row.get("created_at")?;
    let processed_at: Option<String> = row.get("processed_at")?;

    Ok((|| {
        Ok(FeedbackEvent {
            id: row.get("id").map_err(store_err)?,
            task_key: row.get("task_key").map_err(store_err)?,
            agent: row.get("agent").map_err(store_err)?,
            feedback_type: FeedbackType::from_str(&feedback_type)?,
            severity: FeedbackSeverity::from_str(&severity)?,
            message: row.get("message").map_err(store_err)?,
            context: serde_json::from_str(&context_json)?,
            suggestion: row.get("suggestion").map_err(store_err)?,
            created_at: parse_ts(&created_at)?,
            processed_at: processed_at.as_deref().map(parse_ts).transpose()?,
        })
    })())
}

fn parse_ts(s: &str) -> WilsonResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WilsonError::Store(format!("bad timestamp '{s}': {e}")))
}

fn parse_ts_rusqlite(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
}

fn store_err(e: impl std::fmt::Display) -> WilsonError {
    WilsonError::Store(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> WilsonError {
    WilsonError::Store(format!("store task panicked: {e}"))
}

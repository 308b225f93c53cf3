use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

const MAX_RECORDED_RESULT: usize = 4096;

/// One line in the append-only JSONL audit trail — one per tool
/// execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub category: String,
    pub arguments: serde_json::Value,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub confirmed: bool,
    pub user_declined: bool,
    pub user_query: Option<String>,
}

impl AuditRecord {
    /// Cap the recorded result so one verbose tool cannot bloat the log.
    pub fn with_truncated_result(mut self, result: &str) -> Self {
        self.result = Some(if result.len() <= MAX_RECORDED_RESULT {
            result.to_string()
        } else {
            let mut end = MAX_RECORDED_RESULT;
            while !result.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}… [truncated, {} total bytes]", &result[..end], result.len())
        });
        self
    }
}

/// Append-only audit log. Records are handed to a background writer so
/// tool execution never blocks on disk.
pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
}

impl AuditLog {
    /// Create an audit log writing JSONL to `path`. Spawns the writer task.
    pub fn new(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Audit log unavailable");
                    return;
                }
            };
            while let Some(record) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&record) {
                    if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                        warn!(error = %e, "Audit write failed");
                    }
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// No-op log for configurations with auditing disabled.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, record: AuditRecord) {
        info!(
            tool = %record.tool,
            duration_ms = record.duration_ms,
            declined = record.user_declined,
            error = record.error.is_some(),
            "audit"
        );
        if let Some(tx) = &self.tx {
            let _ = tx.send(record);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record() -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            tool: "write_file".to_string(),
            category: "file".to_string(),
            arguments: serde_json::json!({"path": "a.go"}),
            result: None,
            error: None,
            duration_ms: 3,
            confirmed: false,
            user_declined: false,
            user_query: None,
        }
    }

    #[test]
    fn test_result_truncation() {
        let long = "x".repeat(MAX_RECORDED_RESULT + 100);
        let rec = record().with_truncated_result(&long);
        let stored = rec.result.unwrap();
        assert!(stored.len() < long.len());
        assert!(stored.contains("truncated"));

        let short = record().with_truncated_result("ok");
        assert_eq!(short.result.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(path.clone());

        log.record(record());
        log.record(record().with_truncated_result("done"));

        // Give the writer task a moment to flush.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                if content.lines().count() == 2 {
                    let first: serde_json::Value =
                        serde_json::from_str(content.lines().next().unwrap()).unwrap();
                    assert_eq!(first["tool"], "write_file");
                    return;
                }
            }
        }
        panic!("audit lines never appeared");
    }

    #[tokio::test]
    async fn test_disabled_log_is_silent() {
        let log = AuditLog::disabled();
        log.record(record());
    }
}

use crate::error::{WilsonError, WilsonResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Kind of feedback an agent can raise towards the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    DependencyNeeded,
    Success,
    ErrorPattern,
    HelpRequested,
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedbackType::DependencyNeeded => "dependency_needed",
            FeedbackType::Success => "success",
            FeedbackType::ErrorPattern => "error_pattern",
            FeedbackType::HelpRequested => "help_requested",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dependency_needed" => Ok(FeedbackType::DependencyNeeded),
            "success" => Ok(FeedbackType::Success),
            "error_pattern" => Ok(FeedbackType::ErrorPattern),
            "help_requested" => Ok(FeedbackType::HelpRequested),
            other => Err(WilsonError::Task(format!("unknown feedback type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSeverity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for FeedbackSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedbackSeverity::Critical => "critical",
            FeedbackSeverity::Warning => "warning",
            FeedbackSeverity::Info => "info",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FeedbackSeverity {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(FeedbackSeverity::Critical),
            "warning" => Ok(FeedbackSeverity::Warning),
            "info" => Ok(FeedbackSeverity::Info),
            other => Err(WilsonError::Task(format!("unknown severity: {other}"))),
        }
    }
}

/// A typed, persisted message from an agent to the manager.
///
/// The manager's state changes in response to these events are the
/// authoritative control flow for dependency creation and retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default)]
    pub id: i64,
    pub task_key: String,
    pub agent: String,
    pub feedback_type: FeedbackType,
    pub severity: FeedbackSeverity,
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl FeedbackEvent {
    pub fn new(
        task_key: impl Into<String>,
        agent: impl Into<String>,
        feedback_type: FeedbackType,
        severity: FeedbackSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_key: task_key.into(),
            agent: agent.into(),
            feedback_type,
            severity,
            message: message.into(),
            context: HashMap::new(),
            suggestion: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }
}

/// How long a producer waits for channel capacity before giving up.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Producer handle onto the feedback bus.
///
/// Cloneable; `send` blocks up to [`SEND_TIMEOUT`] when the channel is
/// full, then fails with `FeedbackBusTimeout`.
#[derive(Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<FeedbackEvent>,
}

impl FeedbackSender {
    pub fn new(tx: mpsc::Sender<FeedbackEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: FeedbackEvent) -> WilsonResult<()> {
        match self.tx.send_timeout(event, SEND_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(WilsonError::FeedbackBusTimeout),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(WilsonError::Task("feedback bus closed".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_round_trip() {
        let event = FeedbackEvent::new(
            "TASK-002",
            "TestAgent",
            FeedbackType::DependencyNeeded,
            FeedbackSeverity::Critical,
            "Target directory does not exist",
        )
        .with_context("path", serde_json::json!("/tmp/proj"))
        .with_suggestion("Create directory /tmp/proj");

        let json = serde_json::to_string(&event).unwrap();
        let back: FeedbackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.feedback_type, FeedbackType::DependencyNeeded);
        assert_eq!(back.severity, FeedbackSeverity::Critical);
        assert_eq!(back.context_str("path"), Some("/tmp/proj"));
        assert!(back.processed_at.is_none());
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(
            "dependency_needed".parse::<FeedbackType>().unwrap(),
            FeedbackType::DependencyNeeded
        );
        assert!("oops".parse::<FeedbackType>().is_err());
    }

    #[tokio::test]
    async fn test_sender_delivers() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = FeedbackSender::new(tx);
        let event = FeedbackEvent::new(
            "TASK-001",
            "CodeAgent",
            FeedbackType::Success,
            FeedbackSeverity::Info,
            "done",
        );
        sender.send(event).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.task_key, "TASK-001");
    }

    #[tokio::test]
    async fn test_sender_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = FeedbackSender::new(tx);
        let event = FeedbackEvent::new(
            "TASK-001",
            "CodeAgent",
            FeedbackType::Success,
            FeedbackSeverity::Info,
            "done",
        );
        assert!(sender.send(event).await.is_err());
    }
}

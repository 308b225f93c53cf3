use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An informational note from one agent to another (or to everyone).
///
/// Notes never carry control flow; they exist so later agents can pick up
/// context ("Ready for testing", "API changed in user.go").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentNote {
    #[serde(default)]
    pub id: i64,
    pub from_agent: String,
    /// `None` means broadcast.
    pub to_agent: Option<String>,
    /// Grouping key, typically the task key the note refers to.
    pub context_key: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl AgentNote {
    pub fn broadcast(
        from_agent: impl Into<String>,
        context_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            from_agent: from_agent.into(),
            to_agent: None,
            context_key: context_key.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        context_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            from_agent: from_agent.into(),
            to_agent: Some(to_agent.into()),
            context_key: context_key.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_agent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_note() {
        let note = AgentNote::broadcast("CodeAgent", "TASK-001", "Ready for testing");
        assert!(note.is_broadcast());
        assert_eq!(note.message, "Ready for testing");
    }

    #[test]
    fn test_targeted_note() {
        let note = AgentNote::to("CodeAgent", "TestAgent", "TASK-001", "user.go exports User");
        assert!(!note.is_broadcast());
        assert_eq!(note.to_agent.as_deref(), Some("TestAgent"));
    }
}

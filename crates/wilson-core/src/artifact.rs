use crate::error::WilsonError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact produced by an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Test,
    Research,
    Review,
    Analysis,
    Report,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Code => "code",
            ArtifactKind::Test => "test",
            ArtifactKind::Research => "research",
            ArtifactKind::Review => "review",
            ArtifactKind::Analysis => "analysis",
            ArtifactKind::Report => "report",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ArtifactKind::Code),
            "test" => Ok(ArtifactKind::Test),
            "research" => Ok(ArtifactKind::Research),
            "review" => Ok(ArtifactKind::Review),
            "analysis" => Ok(ArtifactKind::Analysis),
            "report" => Ok(ArtifactKind::Report),
            other => Err(WilsonError::Store(format!("unknown artifact kind: {other}"))),
        }
    }
}

/// A typed, append-only blob produced during task execution.
///
/// `id` is 0 until the store assigns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub id: i64,
    pub kind: ArtifactKind,
    pub content: String,
    /// Where the artifact came from, typically a task key.
    pub source: String,
    /// Name of the producing agent.
    pub agent: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        kind: ArtifactKind,
        content: impl Into<String>,
        source: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            kind,
            content: content.into(),
            source: source.into(),
            agent: agent.into(),
            created_at: Utc::now(),
        }
    }
}

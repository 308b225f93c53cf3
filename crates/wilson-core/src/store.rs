use crate::artifact::Artifact;
use crate::error::WilsonResult;
use crate::note::AgentNote;
use async_trait::async_trait;

/// Sink for the context an agent run leaves behind.
///
/// Lives in `wilson-core` so agents can persist artifacts and notes
/// without depending on the store implementation.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Persist an artifact and return its assigned id.
    async fn save_artifact(&self, artifact: &Artifact) -> WilsonResult<i64>;

    /// Persist a note and return its assigned id.
    async fn save_note(&self, note: &AgentNote) -> WilsonResult<i64>;
}

use crate::types::{GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use wilson_core::WilsonResult;

/// Contract every LLM backend implements.
///
/// `generate` is request/response; streaming is intentionally absent from
/// the core. Clients are expected to honour task cancellation through the
/// runtime (requests are dropped when the owning future is).
#[async_trait]
pub trait LlmClient: Send + Sync + std::fmt::Debug {
    async fn generate(&self, request: GenerateRequest) -> WilsonResult<GenerateResponse>;

    /// Cheap availability probe, used to decide purpose→chat fallback.
    async fn is_available(&self) -> bool;

    fn model(&self) -> &str;

    fn provider(&self) -> &str;
}

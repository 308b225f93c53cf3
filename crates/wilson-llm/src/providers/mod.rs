mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::client::LlmClient;
use std::sync::Arc;
use wilson_core::{LlmSettings, WilsonError, WilsonResult};

/// Construct a client from per-purpose settings.
///
/// Fails with a config error for unknown providers — registration is the
/// only place provider strings are interpreted.
pub fn build_client(settings: &LlmSettings) -> WilsonResult<Arc<dyn LlmClient>> {
    match settings.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(settings))),
        "openai" | "openai-compatible" => Ok(Arc::new(OpenAiClient::new(settings))),
        other => Err(WilsonError::Config(format!("unsupported provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_known_providers() {
        let mut settings = LlmSettings::new("m");
        assert!(build_client(&settings).is_ok());

        settings.provider = "openai".to_string();
        assert!(build_client(&settings).is_ok());

        settings.provider = "openai-compatible".to_string();
        assert!(build_client(&settings).is_ok());
    }

    #[test]
    fn test_unsupported_provider() {
        let mut settings = LlmSettings::new("m");
        settings.provider = "bedrock".to_string();
        let err = build_client(&settings).unwrap_err();
        assert!(matches!(err, WilsonError::Config(_)));
        assert!(err.to_string().contains("bedrock"));
    }
}

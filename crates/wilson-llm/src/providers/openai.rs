use crate::client::LlmClient;
use crate::types::{GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use wilson_core::{LlmSettings, WilsonError, WilsonResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Client for any OpenAI-compatible chat-completions endpoint
/// (OpenAI itself, llama.cpp server, vLLM, LM Studio, …).
#[derive(Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: settings.api_key.clone().unwrap_or_default(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: GenerateRequest) -> WilsonResult<GenerateResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| WilsonError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| WilsonError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(WilsonError::Http(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        let content = resp_body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| WilsonError::Generation("missing content in OpenAI response".into()))?
            .to_string();

        let model = resp_body["model"]
            .as_str()
            .unwrap_or(&self.model)
            .to_string();

        Ok(GenerateResponse {
            content,
            model,
            tokens_used: resp_body["usage"]["total_tokens"].as_u64(),
            metadata: HashMap::new(),
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

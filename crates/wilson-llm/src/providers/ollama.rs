use crate::client::LlmClient;
use crate::types::{GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use wilson_core::{LlmSettings, WilsonError, WilsonResult};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a local Ollama server (`/api/chat`, non-streaming).
#[derive(Debug)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    options: HashMap<String, serde_json::Value>,
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
            temperature: settings.temperature,
            options: settings.options.clone(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, request: GenerateRequest) -> WilsonResult<GenerateResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let mut options = serde_json::Map::new();
        options.insert(
            "temperature".to_string(),
            serde_json::json!(request.temperature.unwrap_or(self.temperature)),
        );
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), serde_json::json!(max_tokens));
        }
        for (k, v) in self.options.iter().chain(request.options.iter()) {
            options.insert(k.clone(), v.clone());
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": options,
        });

        let resp = self
            .http
            .post(&url)
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
                "Ollama API error {status}: {resp_body}"
            )));
        }

        let content = resp_body["message"]["content"]
            .as_str()
            .ok_or_else(|| WilsonError::Generation("missing content in Ollama response".into()))?
            .to_string();

        let model = resp_body["model"]
            .as_str()
            .unwrap_or(&self.model)
            .to_string();

        let tokens_used = match (
            resp_body["prompt_eval_count"].as_u64(),
            resp_body["eval_count"].as_u64(),
        ) {
            (Some(p), Some(e)) => Some(p + e),
            (Some(n), None) | (None, Some(n)) => Some(n),
            (None, None) => None,
        };

        Ok(GenerateResponse {
            content,
            model,
            tokens_used,
            metadata: HashMap::new(),
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "ollama"
    }
}

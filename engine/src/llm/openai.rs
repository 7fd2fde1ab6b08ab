use super::{Completion, CompletionRequest, LLMError, LLMProvider};
use crate::config::GenerationConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Provider for any OpenAI-compatible `/chat/completions` endpoint
/// (Mistral, OpenAI, vLLM, llama.cpp server, ...)
pub struct OpenAIProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Build from config, reading the API key from the configured env var
    pub fn from_config(config: &GenerationConfig) -> Result<Self, LLMError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> super::Result<Completion> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed("No API key configured for generation service".into())
        })?;

        let url = format!("{}/chat/completions", self.base_url);

        let api_messages: Vec<_> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": request.model,
            "messages": api_messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                s if s >= 500 => LLMError::ProviderUnavailable(format!("HTTP {}: {}", s, text)),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::ParseError(e.to_string())
            }
        })?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&request.model)
            .to_string();

        Ok(Completion { model, content })
    }
}

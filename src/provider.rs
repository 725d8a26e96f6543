use std::time::Duration;

use axum::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Upstream LLM provider capability: a lightweight key probe used when a
/// credential is stored, and a synchronous chat completion used by job workers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// `Ok(false)` means the provider rejected the key (401). Timeouts and
    /// transport failures are errors, not a negative probe.
    async fn probe_key(&self, api_key: &str) -> Result<bool, ApiError>;

    /// Returns the single completion text for the given messages.
    async fn chat(
        &self,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ApiError>;
}

pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    fn classify(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::ExternalServiceTimeout
        } else {
            ApiError::ExternalService(format!("network error: {e}"))
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn probe_key(&self, api_key: &str) -> Result<bool, ApiError> {
        let resp = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::ApiKeyValidation("validation request timed out".into())
                } else {
                    warn!(error = %e, "api key probe network error");
                    ApiError::ApiKeyValidation("validation request failed".into())
                }
            })?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                info!("api key probe succeeded");
                Ok(true)
            }
            reqwest::StatusCode::UNAUTHORIZED => {
                warn!("api key probe rejected (401)");
                Ok(false)
            }
            status => {
                warn!(%status, "unexpected api key probe response");
                Ok(false)
            }
        }
    }

    async fn chat(
        &self,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ApiError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": 4000,
            "temperature": 0.7,
        });

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = resp.status();
        if !status.is_success() {
            // surface the upstream message where it is available
            let mut message = format!("openai api error: {}", status.as_u16());
            if let Ok(payload) = resp.json::<serde_json::Value>().await {
                if let Some(detail) = payload
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                {
                    message.push_str(" - ");
                    message.push_str(detail);
                }
            }
            return Err(ApiError::ExternalService(message));
        }

        let completion: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::ExternalService(format!("malformed response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApiError::ExternalService("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let msg = ChatMessage::system("you are helpful");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "system");
        assert_eq!(v["content"], "you are helpful");

        let msg = ChatMessage::user("hi");
        assert_eq!(serde_json::to_value(&msg).unwrap()["role"], "user");
    }

    #[test]
    fn completion_response_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}

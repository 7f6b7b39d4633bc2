//! Model Gateway - text completion against a hosted model
//!
//! The pipeline only needs "system instruction + user text in, text out".
//! `LlmClient` speaks the OpenAI-compatible `/chat/completions` API, so any
//! hosted or local server exposing that endpoint can be plugged in.

use crate::config::{ModelConfig, SamplingConfig};
use crate::error::{AgentError, GatewayFailureKind, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Anything that can turn an instruction and a user message into text
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    sampling: SamplingConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            sampling: SamplingConfig::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig, api_key: &str) -> Self {
        Self::new(
            api_key.to_string(),
            config.model_id.clone(),
            config.base_url.clone(),
        )
        .with_sampling(config.sampling.clone())
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    fn request_body(&self, system: &str, user: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": self.sampling.temperature,
            "top_p": self.sampling.top_p,
            "max_tokens": self.sampling.max_output_tokens,
        })
    }
}

#[async_trait]
impl ModelGateway for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        debug!(model = %self.model, "Calling model gateway");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(system, user))
            .send()
            .await
            .map_err(|e| AgentError::gateway(GatewayFailureKind::Transport, format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            warn!(%status, "Model gateway returned an error status");
            return Err(AgentError::gateway(
                classify_status(status),
                format!("HTTP {}: {}", status, snippet),
            ));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::gateway(
                GatewayFailureKind::MalformedResponse,
                format!("Failed to parse LLM response: {}", e),
            )
        })?;

        extract_content(&response_json)
    }
}

fn classify_status(status: StatusCode) -> GatewayFailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayFailureKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => GatewayFailureKind::Throttling,
        _ => GatewayFailureKind::Transport,
    }
}

fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AgentError::gateway(
                GatewayFailureKind::MalformedResponse,
                "No content in LLM response",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), GatewayFailureKind::Auth);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), GatewayFailureKind::Auth);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), GatewayFailureKind::Throttling);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), GatewayFailureKind::Transport);
    }

    #[test]
    fn test_extract_content() {
        let ok = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]
        });
        assert_eq!(extract_content(&ok).unwrap(), "SELECT 1");

        let missing = serde_json::json!({"choices": []});
        match extract_content(&missing) {
            Err(AgentError::Gateway { kind, .. }) => {
                assert_eq!(kind, GatewayFailureKind::MalformedResponse)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_request_body_carries_sampling() {
        let client = LlmClient::new("k".into(), "m".into(), "http://localhost".into())
            .with_sampling(SamplingConfig {
                max_output_tokens: 128,
                temperature: 0.5,
                top_p: 0.8,
            });
        let body = client.request_body("sys", "hi");
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}

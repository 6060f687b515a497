//! Blocking client for OpenAI-compatible chat-completions endpoints.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::debug;

use fuzz_driver_core::TextGenerator;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    agent: ureq::Agent,
}

impl OpenAiClient {
    /// Default request timeout in seconds (can be overridden by env).
    const DEFAULT_TIMEOUT_SECS: u64 = 120;
    /// Default connect timeout in seconds (can be overridden by env).
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn default_timeouts() -> (Duration, Duration) {
        let timeout_secs = std::env::var("FUZZ_DRIVER_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        let connect_secs = std::env::var("FUZZ_DRIVER_LLM_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_CONNECT_TIMEOUT_SECS);
        (
            Duration::from_secs(timeout_secs),
            Duration::from_secs(connect_secs),
        )
    }

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// Client for the public OpenAI endpoint, keyed from `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
            .with_api_key(std::env::var(API_KEY_ENV).ok())
    }

    pub fn new(endpoint: &str, model: &str) -> Self {
        let (timeout, connect_timeout) = Self::default_timeouts();
        Self::with_timeouts(endpoint, model, timeout, connect_timeout)
    }

    pub fn with_timeouts(
        endpoint: &str,
        model: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            agent: Self::build_agent(timeout, connect_timeout),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

/// `choices[0].message.content` of a chat-completions response.
pub fn extract_completion(response: &Value) -> Result<String> {
    if let Some(error) = response.get("error") {
        let msg = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(anyhow!("API error: {}", msg));
    }
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("No completion content in response"))
}

impl TextGenerator for OpenAiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = self.request_body(prompt);
        debug!(endpoint = %self.endpoint, model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response: Value = match request.send_json(&body) {
            Ok(resp) => resp
                .into_json()
                .context("Failed to parse completion response")?,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(anyhow!("Completion request failed with HTTP {}: {}", code, text));
            }
            Err(e) => return Err(anyhow!("Completion request failed: {}", e)),
        };

        extract_completion(&response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_has_single_user_message() {
        let client = OpenAiClient::new("http://localhost:1/v1/chat/completions", "gpt-4")
            .with_temperature(Some(0.2));
        let body = client.request_body("write a driver");
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "write a driver");
        assert_eq!(body["temperature"], 0.2);
    }

    #[test]
    fn test_extract_completion() {
        let response = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "```c\nint x;\n```" } }]
        });
        assert_eq!(extract_completion(&response).unwrap(), "```c\nint x;\n```");
    }

    #[test]
    fn test_extract_completion_errors() {
        let err = extract_completion(&serde_json::json!({
            "error": { "message": "Incorrect API key provided" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Incorrect API key"));

        assert!(extract_completion(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let client = OpenAiClient::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
            .with_api_key(Some("  ".to_string()));
        assert!(client.api_key.is_none());
        assert_eq!(client.name(), "gpt-4");
    }
}

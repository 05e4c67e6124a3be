//! OpenAI-compatible chat-completions driver
//!
//! Speaks the `/v1/chat/completions` shape, which covers OpenAI itself plus
//! the local servers (Ollama, llama.cpp, vLLM) that mimic it. One prompt in,
//! one message out; retries and timeouts live in
//! [`super::runner::RetryRunner`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use sessionstore::TokenUsage;

use super::runner::{EngineInfo, ModelRunner, RunOutput};
use super::LlmError;
use crate::config::LlmConfig;

pub struct HttpRunner {
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl HttpRunner {
    /// Create a driver from config; the API key is read from the configured
    /// environment variable and absent keys are allowed (local servers).
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&config.api_key_env).ok()
        };

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

#[async_trait]
impl ModelRunner for HttpRunner {
    async fn run(&self, prompt: &str) -> Result<RunOutput, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(%self.model, prompt_chars = prompt.len(), "run: sending chat completion");

        let mut request = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&self.build_request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(LlmError::Network)?;
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let api_response: ChatResponse = response.json().await?;
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no message content".to_string()))?;

        let usage = api_response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(RunOutput { text, usage })
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            engine: "openai".to_string(),
            model: self.model.clone(),
            endpoint: self.base_url.clone(),
        }
    }
}

// Chat-completions response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_body() {
        let runner = HttpRunner {
            model: "gpt-4o-mini".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            http: Client::new(),
        };
        let body = runner.build_request_body("classify these tabs");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "classify these tabs");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let config = LlmConfig {
            base_url: "http://localhost:11434/".to_string(),
            api_key_env: String::new(),
            ..Default::default()
        };
        let runner = HttpRunner::from_config(&config).unwrap();
        assert_eq!(runner.base_url, "http://localhost:11434");
        assert!(runner.api_key.is_none());
    }
}

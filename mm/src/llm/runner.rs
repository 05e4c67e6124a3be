//! ModelRunner trait definition
//!
//! The core's only view of an LLM: one prompt in, one text response out.
//! Each call is independent; no conversation state is carried between
//! passes. Drivers are behind this trait so the pipeline never knows which
//! vendor it is talking to.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use sessionstore::TokenUsage;

use super::LlmError;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// One model response
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Provenance for an engine, recorded into session meta
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub engine: String,
    pub model: String,
    pub endpoint: String,
}

/// Stateless model runner - each call is independent
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Send one prompt and wait for the full response
    async fn run(&self, prompt: &str) -> Result<RunOutput, LlmError>;

    /// Identify the engine behind this runner
    fn info(&self) -> EngineInfo;
}

/// Wraps any driver with the core's timeout and retry policy.
///
/// Every call gets a bounded timeout and up to `max_retries` retries with
/// the unchanged prompt. Dropping the returned future cancels the in-flight
/// driver call, so outer cancellation propagates.
pub struct RetryRunner {
    inner: Arc<dyn ModelRunner>,
    call_timeout: Duration,
    max_retries: u32,
}

impl RetryRunner {
    pub fn new(inner: Arc<dyn ModelRunner>, call_timeout: Duration, max_retries: u32) -> Self {
        Self {
            inner,
            call_timeout,
            max_retries,
        }
    }
}

#[async_trait]
impl ModelRunner for RetryRunner {
    async fn run(&self, prompt: &str) -> Result<RunOutput, LlmError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "run: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.call_timeout, self.inner.run(prompt)).await {
                Ok(Ok(output)) => {
                    debug!(attempt, chars = output.text.len(), "run: success");
                    return Ok(output);
                }
                Ok(Err(e)) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(attempt, error = %e, "run: retryable error");
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) if attempt < self.max_retries => {
                    debug!(attempt, "run: call timed out");
                    last_error = Some(LlmError::Timeout(self.call_timeout));
                }
                Err(_) => return Err(LlmError::Timeout(self.call_timeout)),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Retry budget exhausted".to_string())))
    }

    fn info(&self) -> EngineInfo {
        self.inner.info()
    }
}

/// Scripted runner for tests and offline runs: returns queued responses in
/// order, then errors when exhausted.
pub struct MockRunner {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockRunner {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Queue an error result in place of a response
    pub fn new_with(results: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(results.into_iter().collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRunner for MockRunner {
    async fn run(&self, _prompt: &str) -> Result<RunOutput, LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("No more mock responses".to_string())));
        next.map(|text| RunOutput {
            text,
            usage: Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            }),
        })
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            engine: "mock".to_string(),
            model: "scripted".to_string(),
            endpoint: "memory".to_string(),
        }
    }
}

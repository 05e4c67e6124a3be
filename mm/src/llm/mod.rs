//! Model runner module
//!
//! Abstract request/response to an LLM engine with the core's timeout and
//! retry policy applied uniformly.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

mod error;
mod http;
mod runner;

pub use error::LlmError;
pub use http::HttpRunner;
pub use runner::{EngineInfo, MockRunner, ModelRunner, RetryRunner, RunOutput};

use crate::config::Config;

/// Create a runner for the given engine id, wrapped with the configured
/// timeout/retry policy. Unknown ids are an error, not a fallback.
pub fn create_runner(config: &Config, engine_id: &str) -> Result<Arc<dyn ModelRunner>, LlmError> {
    debug!(%engine_id, "create_runner: called");
    let driver: Arc<dyn ModelRunner> = match engine_id {
        "openai" | "ollama" => Arc::new(HttpRunner::from_config(&config.llm)?),
        other => return Err(LlmError::UnknownEngine(other.to_string())),
    };

    Ok(Arc::new(RetryRunner::new(
        driver,
        Duration::from_millis(config.llm.timeout_ms),
        config.llm.max_retries,
    )))
}

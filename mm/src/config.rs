//! Configuration for the memento engine

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-call model timeout (3 minutes)
pub const DEFAULT_TIMEOUT_MS: u64 = 180_000;

/// Default retry budget for a model call (retries, not attempts)
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User-scoped state directory (sessions, lock, blocklist, task log)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Prompt template overrides and learned rules
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,

    /// Domain rules and other long-lived memory files
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,

    /// Markdown research-interest notes (optional collaborator)
    #[serde(default)]
    pub interests_dir: Option<PathBuf>,

    /// Engine id used when a capture does not name one
    #[serde(default = "default_engine")]
    pub default_engine: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    /// Capture raw pass transcripts into the artifact
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name sent to the chat-completions endpoint
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key; empty means unauthenticated
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt, with unchanged prompt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Token unit prices; configuration, not contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Dollars per million input tokens
    #[serde(default = "default_input_price")]
    pub input_per_mtok: f64,

    /// Dollars per million output tokens
    #[serde(default = "default_output_price")]
    pub output_per_mtok: f64,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".memento")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_memory_dir() -> PathBuf {
    default_data_dir().join("memory")
}

fn default_engine() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_api_key_env() -> String {
    "MEMENTO_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_input_price() -> f64 {
    1.0
}

fn default_output_price() -> f64 {
    5.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_mtok: default_input_price(),
            output_per_mtok: default_output_price(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            prompts_dir: default_prompts_dir(),
            memory_dir: default_memory_dir(),
            interests_dir: None,
            default_engine: default_engine(),
            llm: LlmConfig::default(),
            pricing: PricingConfig::default(),
            debug: false,
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("memento").join("config.yml")),
            Some(PathBuf::from("memento.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn reclassifications_dir(&self) -> PathBuf {
        self.data_dir.join("reclassifications")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("lock.json")
    }

    pub fn user_context_path(&self) -> PathBuf {
        self.data_dir.join("context.json")
    }

    pub fn learned_rules_path(&self) -> PathBuf {
        self.prompts_dir.join("learned-rules.json")
    }

    pub fn domain_rules_path(&self) -> PathBuf {
        self.memory_dir.join("domain-rules.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.timeout_ms, 180_000);
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.pricing.input_per_mtok, 1.0);
        assert_eq!(config.pricing.output_per_mtok, 5.0);
        assert!(config.sessions_dir().ends_with("sessions"));
        assert!(config.lock_path().ends_with("lock.json"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("default_engine: mock\ndebug: true\n").unwrap();
        assert_eq!(config.default_engine, "mock");
        assert!(config.debug);
        assert_eq!(config.llm.max_retries, 2);
    }
}

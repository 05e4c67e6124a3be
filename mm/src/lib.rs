//! Memento - session-based tab triage engine
//!
//! Captures a browser session's open tabs, classifies them through a
//! four-pass LLM pipeline, persists each session as an immutable artifact,
//! and supports forced-completion disposition of the classified items under
//! a process-wide capture lock. Across sessions it mines ghost tabs,
//! project health, distraction signatures, and themes, and learns the
//! user's corrections as classification preferences.
//!
//! # Modules
//!
//! - [`classify`] - the four-pass pipeline, response repair, keyword fallback
//! - [`llm`] - model runner trait, retry/timeout policy, HTTP driver
//! - [`lock`] - the single-slot capture lock
//! - [`learning`] - correction mining, preference and domain-rule stores
//! - [`analysis`] - longitudinal aggregation, queries, theme detection
//! - [`tasks`] - ranked attention prompts and their write-through actions
//! - [`engine`] - the facade the serving layer calls
//! - [`config`] - configuration types and loading

pub mod analysis;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod fsutil;
pub mod learning;
pub mod llm;
pub mod lock;
pub mod prompts;
pub mod tasks;

// Re-export commonly used types
pub use analysis::{
    Aggregate, DistractionSignature, ProjectHealth, RecurringTab, Theme, ThemeAction, ThemeDetector,
    get_distraction_signature, get_project_health, get_recurring_unfinished,
};
pub use classify::{Classifier, ClassifyContext, ClassifyOutcome, Project, Tab};
pub use config::{Config, LlmConfig, PricingConfig};
pub use engine::{ClassifyRequest, EngineError, Memento, Reclassification, open_at};
pub use learning::{CorrectionAnalyzer, DomainRuleStore, PreferenceRule, PreferenceStore};
pub use llm::{EngineInfo, HttpRunner, LlmError, MockRunner, ModelRunner, RetryRunner, RunOutput, create_runner};
pub use lock::{LockError, LockManager, LockRecord, LockStatus};
pub use prompts::PromptLoader;
pub use tasks::{CandidateTask, TaskActions, TaskGenerator, TaskType};

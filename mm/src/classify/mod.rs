//! Classifier: the four-pass LLM pipeline
//!
//! Pass 1 classifies and triages the capture, pass 2 deep-dives flagged
//! tabs, pass 3 renders a Mermaid visualization, pass 4 runs thematic
//! analysis. Failures in passes 2-4 are recovered locally; a pass 1 failure
//! drops the whole capture to the deterministic keyword fallback.

use serde::{Deserialize, Serialize};

mod attribution;
mod categories;
mod context;
mod fallback;
mod parse;
mod pipeline;

pub use attribution::{Attribution, attribute};
pub use categories::{BASE_CATEGORIES, project_category_label, suggested_action};
pub use context::{AppliedPreference, context_block, domain_matches, hostname, match_preferences, preference_lines};
pub use fallback::{MockClassification, classify_mock};
pub use parse::{Assignment, Pass1Output, parse_pass1, parse_thematic, repair_json, strip_ansi, strip_fences, validate_mermaid};
pub use pipeline::{Classifier, ClassifyOutcome};

/// Maximum tab content carried into classification (8KB)
pub const MAX_TAB_CONTENT_BYTES: usize = 8 * 1024;

/// Content budget for a single deep-dive prompt
pub const DEEP_DIVE_CONTENT_CHARS: usize = 4000;

/// One captured tab; transient, lives only during classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub needs_visual_extraction: bool,
}

/// An active user project, supplied by the capture context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category_type: Option<String>,
}

/// Optional context shipped with a capture
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyContext {
    #[serde(default)]
    pub active_projects: Vec<Project>,
}

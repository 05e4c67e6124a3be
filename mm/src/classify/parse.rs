//! Response repair and parsing
//!
//! Model responses are "mostly JSON" (passes 1, 2, 4) or "mostly Mermaid"
//! (pass 3), wrapped in whatever noise the driver let through: ANSI escapes,
//! code fences, prose before and after. The repair pipeline strips all of
//! that before handing the remainder to serde.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

use sessionstore::{DeepDiveRequest, ThematicAnalysis};

use crate::llm::LlmError;

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\x1b\\[[0-9;]*[A-Za-z]").unwrap())
}

fn mermaid_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(graph|flowchart)\s+(TB|TD|BT|LR|RL)\b").unwrap())
}

/// Remove ANSI escape sequences
pub fn strip_ansi(s: &str) -> String {
    ansi_re().replace_all(s, "").to_string()
}

/// Remove Markdown code fences, keeping their contents
pub fn strip_fences(s: &str) -> String {
    s.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Repair a noisy response down to one JSON object: strip ANSI, drop fences,
/// slice from the first `{` to the last `}`, then parse.
pub fn repair_json(raw: &str) -> Result<Value, LlmError> {
    let cleaned = strip_fences(&strip_ansi(raw));
    let start = cleaned
        .find('{')
        .ok_or_else(|| LlmError::InvalidResponse("No JSON object in response".to_string()))?;
    let end = cleaned
        .rfind('}')
        .ok_or_else(|| LlmError::InvalidResponse("No closing brace in response".to_string()))?;
    if end < start {
        return Err(LlmError::InvalidResponse("Braces out of order in response".to_string()));
    }
    let sliced = &cleaned[start..=end];
    serde_json::from_str(sliced).map_err(|e| LlmError::InvalidResponse(format!("JSON repair failed: {e}")))
}

/// A per-tab assignment, in either shape the model is allowed to return
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Assignment {
    /// Full auditable record
    Auditable {
        category: String,
        #[serde(default)]
        signals: Vec<String>,
        #[serde(default)]
        confidence: Option<String>,
    },
    /// Legacy shape: just the category name
    Legacy(String),
}

impl Assignment {
    pub fn category(&self) -> &str {
        match self {
            Assignment::Auditable { category, .. } => category,
            Assignment::Legacy(category) => category,
        }
    }

    pub fn signals(&self) -> Vec<String> {
        match self {
            Assignment::Auditable { signals, .. } => signals.clone(),
            Assignment::Legacy(_) => Vec::new(),
        }
    }

    pub fn confidence(&self) -> String {
        match self {
            Assignment::Auditable { confidence, .. } => confidence.clone().unwrap_or_default(),
            Assignment::Legacy(_) => String::new(),
        }
    }
}

/// Parsed pass 1 output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pass1Output {
    pub assignments: BTreeMap<String, Assignment>,
    pub narrative: String,
    pub session_intent: String,
    #[serde(skip)]
    pub deep_dive: Vec<DeepDiveRequest>,
    #[serde(rename = "deepDive")]
    deep_dive_raw: Vec<Value>,
    pub overall_confidence: String,
    pub uncertainties: Vec<String>,
}

/// Parse the pass 1 response through the repair pipeline
pub fn parse_pass1(raw: &str) -> Result<Pass1Output, LlmError> {
    let value = repair_json(raw)?;
    let mut output: Pass1Output = serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidResponse(format!("Pass 1 shape mismatch: {e}")))?;

    // deep-dive entries are parsed tolerantly; a malformed entry is dropped
    // rather than failing the pass
    output.deep_dive = std::mem::take(&mut output.deep_dive_raw)
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<DeepDiveRequest>(v.clone()) {
            Ok(req) => Some(req),
            Err(e) => {
                warn!(entry = %v, error = %e, "Dropping malformed deepDive entry");
                None
            }
        })
        .collect();

    debug!(
        assignments = output.assignments.len(),
        deep_dive = output.deep_dive.len(),
        "parse_pass1: parsed"
    );
    Ok(output)
}

/// Validate a pass 3 response as Mermaid source.
///
/// Accepts a leading `graph`/`flowchart` directive with one of the five
/// orientations, case-insensitive, after fence/ANSI cleanup.
pub fn validate_mermaid(raw: &str) -> Result<String, String> {
    let cleaned = strip_fences(&strip_ansi(raw)).trim().to_string();
    if cleaned.is_empty() {
        return Err("Empty visualization response".to_string());
    }
    if mermaid_header_re().is_match(&cleaned) {
        Ok(cleaned)
    } else {
        let head: String = cleaned.chars().take(60).collect();
        Err(format!("Response does not start with a Mermaid graph header: {head:?}"))
    }
}

/// Parse the pass 4 response into a thematic analysis, tolerating missing
/// fields
pub fn parse_thematic(raw: &str) -> Result<ThematicAnalysis, LlmError> {
    let value = repair_json(raw)?;
    serde_json::from_value(value).map_err(|e| LlmError::InvalidResponse(format!("Pass 4 shape mismatch: {e}")))
}

//! Session artifact types
//!
//! A session is one capture of a user's open tabs plus the classification
//! derived from it. The artifact is immutable after creation except for the
//! append-only `dispositions` list, the `efforts` list, and the thematic
//! fields written once during pass 4.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::disposition::Disposition;
use crate::effort::Effort;

/// Unique identifier for a session (timestamp-derived, filename-safe)
pub type SessionId = String;

/// Category name for tabs the model failed to assign
pub const UNCLASSIFIED: &str = "Unclassified";

/// Current artifact schema version
pub const SCHEMA_VERSION: u32 = 3;

/// Capture mode for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Passive view; no lock taken
    #[default]
    Results,
    /// Forced-completion workflow gated by the capture lock
    Launchpad,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Results => write!(f, "results"),
            Self::Launchpad => write!(f, "launchpad"),
        }
    }
}

/// A classified tab inside a category group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupItem {
    /// 1-based index into the captured tab list
    pub tab_index: u32,
    pub title: String,
    pub url: String,
}

/// Suggested follow-up action for one category
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTask {
    pub category: String,
    pub suggested_action: String,
    pub tab_count: u32,
}

/// A tab flagged by pass 1 for deep-dive analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepDiveRequest {
    pub tab_index: u32,
    pub reason: String,
    #[serde(default)]
    pub extract_hints: Vec<String>,
}

/// Pass 2 output for one flagged tab
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepDiveResult {
    pub url: String,
    pub title: String,
    /// Structured analysis, or null when the per-tab pass failed
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pass 3 output
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    /// Mermaid diagram source, or null when validation failed
    #[serde(default)]
    pub mermaid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub failures_visualized: u32,
}

/// Pass 4 output
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThematicAnalysis {
    /// Per-project support signals, keyed by project name
    #[serde(default)]
    pub project_support: BTreeMap<String, Value>,
    #[serde(default)]
    pub thematic_throughlines: Vec<String>,
    #[serde(default)]
    pub alternative_narrative: String,
    #[serde(default)]
    pub hidden_connection: String,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub session_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-tab classification audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabReasoning {
    pub category: String,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub confidence: String,
    pub title: String,
    pub url: String,
}

/// Classification audit trail
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Reasoning {
    /// Keyed by tab index rendered as a string ("1".."N")
    #[serde(default)]
    pub per_tab: BTreeMap<String, TabReasoning>,
    #[serde(default)]
    pub overall_confidence: String,
    #[serde(default)]
    pub uncertainties: Vec<String>,
}

/// Token counts reported by the model driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Dollar cost derived from [`TokenUsage`] at configured unit prices
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

/// Wall-clock timing per pipeline pass, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PassTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass1: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass2: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass3: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass4: Option<u64>,
    #[serde(default)]
    pub total: u64,
}

/// Provenance and accounting for one classification run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub schema_version: u32,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: String,
    /// Highest pass that ran (1..4)
    #[serde(default)]
    pub passes: u8,
    #[serde(default)]
    pub timing: PassTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBreakdown>,
    /// "llm" for pipeline output, "mock" for the deterministic fallback
    #[serde(default)]
    pub source: String,
    /// Assigned by the store on save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// One captured session and its classification artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mode: SessionMode,
    pub total_tabs: u32,
    pub classified_count: u32,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub session_intent: String,
    /// Category name -> classified tabs; membership is authoritative
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<GroupItem>>,
    #[serde(default)]
    pub tasks: Vec<CategoryTask>,
    #[serde(default)]
    pub deep_dive: Vec<DeepDiveRequest>,
    #[serde(default)]
    pub deep_dive_results: Vec<DeepDiveResult>,
    #[serde(default)]
    pub visualization: Visualization,
    #[serde(default)]
    pub thematic_analysis: ThematicAnalysis,
    #[serde(default)]
    pub reasoning: Reasoning,
    pub meta: SessionMeta,
    /// Append-only; never edited in place
    #[serde(default)]
    pub dispositions: Vec<Disposition>,
    #[serde(default)]
    pub efforts: Vec<Effort>,
    /// Raw pass transcripts, captured only in debug mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

impl Session {
    /// Create an empty artifact shell stamped now
    pub fn new(mode: SessionMode, total_tabs: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            mode,
            total_tabs,
            classified_count: 0,
            narrative: String::new(),
            session_intent: String::new(),
            groups: BTreeMap::new(),
            tasks: Vec::new(),
            deep_dive: Vec::new(),
            deep_dive_results: Vec::new(),
            visualization: Visualization::default(),
            thematic_analysis: ThematicAnalysis::default(),
            reasoning: Reasoning::default(),
            meta: SessionMeta {
                schema_version: SCHEMA_VERSION,
                ..Default::default()
            },
            dispositions: Vec::new(),
            efforts: Vec::new(),
            trace: None,
        }
    }

    /// Derive the filename-safe session id from a timestamp.
    ///
    /// UTC RFC3339 with milliseconds stripped and `:` replaced by `-`.
    pub fn id_for(timestamp: &DateTime<Utc>) -> SessionId {
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true).replace(':', "-")
    }

    /// The id this session would be stored under
    pub fn id(&self) -> SessionId {
        Self::id_for(&self.timestamp)
    }

    /// Stable item key: the tab's url, or a synthetic index key when absent
    pub fn item_key(item: &GroupItem) -> String {
        if item.url.is_empty() {
            format!("tab-{}", item.tab_index)
        } else {
            item.url.clone()
        }
    }

    /// Iterate all classified items across groups
    pub fn items(&self) -> impl Iterator<Item = (&str, &GroupItem)> {
        self.groups
            .iter()
            .flat_map(|(category, items)| items.iter().map(move |i| (category.as_str(), i)))
    }

    /// Find an item by disposition item id (url, synthetic index key, or title)
    pub fn find_item(&self, item_id: &str) -> Option<(&str, &GroupItem)> {
        self.items().find(|(_, i)| {
            i.url == item_id || format!("tab-{}", i.tab_index) == item_id || i.title == item_id
        })
    }

    /// Check structural invariants; returns human-readable violations.
    ///
    /// Verifies that group membership matches `classified_count`, that every
    /// tab index is in range and appears in exactly one category, that the
    /// reasoning keys mirror the groups, and that the schema version is set.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen: BTreeMap<u32, &str> = BTreeMap::new();
        let mut total = 0u32;
        for (category, items) in &self.groups {
            for item in items {
                // force-assigned Unclassified tabs do not count as classified
                if category != UNCLASSIFIED {
                    total += 1;
                }
                if item.tab_index < 1 || item.tab_index > self.total_tabs {
                    problems.push(format!(
                        "tabIndex {} in {:?} out of range 1..={}",
                        item.tab_index, category, self.total_tabs
                    ));
                }
                if let Some(prev) = seen.insert(item.tab_index, category) {
                    problems.push(format!(
                        "tabIndex {} appears in both {:?} and {:?}",
                        item.tab_index, prev, category
                    ));
                }
            }
        }

        if total != self.classified_count {
            problems.push(format!(
                "classifiedCount {} does not match group membership {}",
                self.classified_count, total
            ));
        }
        if self.classified_count > self.total_tabs {
            problems.push(format!(
                "classifiedCount {} exceeds totalTabs {}",
                self.classified_count, self.total_tabs
            ));
        }

        let reasoning_keys: BTreeSet<u32> = self
            .reasoning
            .per_tab
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect();
        let group_keys: BTreeSet<u32> = seen.keys().copied().collect();
        if !self.reasoning.per_tab.is_empty() && reasoning_keys != group_keys {
            problems.push("reasoning.perTab keys do not match group membership".to_string());
        }

        if self.meta.schema_version == 0 {
            problems.push("meta.schemaVersion is unset".to_string());
        }

        for d in &self.dispositions {
            if d.at < self.timestamp {
                problems.push(format!(
                    "disposition for {:?} at {} predates session timestamp",
                    d.item_id, d.at
                ));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(idx: u32, url: &str) -> GroupItem {
        GroupItem {
            tab_index: idx,
            title: format!("Tab {idx}"),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_id_strips_millis_and_colons() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 15).unwrap();
        assert_eq!(Session::id_for(&ts), "2026-08-01T09-30-15Z");
    }

    #[test]
    fn test_item_key_prefers_url() {
        let i = item(3, "https://example.com/a");
        assert_eq!(Session::item_key(&i), "https://example.com/a");
        let i = item(3, "");
        assert_eq!(Session::item_key(&i), "tab-3");
    }

    #[test]
    fn test_verify_clean_session() {
        let mut s = Session::new(SessionMode::Results, 2);
        s.groups.insert("Research".into(), vec![item(1, "https://a.example")]);
        s.groups.insert("Shopping".into(), vec![item(2, "https://b.example")]);
        s.classified_count = 2;
        assert!(s.verify().is_empty(), "{:?}", s.verify());
    }

    #[test]
    fn test_verify_catches_count_mismatch() {
        let mut s = Session::new(SessionMode::Results, 2);
        s.groups.insert("Research".into(), vec![item(1, "https://a.example")]);
        s.classified_count = 2;
        assert!(!s.verify().is_empty());
    }

    #[test]
    fn test_verify_catches_duplicate_index() {
        let mut s = Session::new(SessionMode::Results, 2);
        s.groups.insert("Research".into(), vec![item(1, "https://a.example")]);
        s.groups.insert("News".into(), vec![item(1, "https://a.example")]);
        s.classified_count = 2;
        let problems = s.verify();
        assert!(problems.iter().any(|p| p.contains("appears in both")));
    }

    #[test]
    fn test_verify_catches_out_of_range_index() {
        let mut s = Session::new(SessionMode::Results, 1);
        s.groups.insert("Research".into(), vec![item(5, "https://a.example")]);
        s.classified_count = 1;
        let problems = s.verify();
        assert!(problems.iter().any(|p| p.contains("out of range")));
    }

    #[test]
    fn test_verify_unclassified_not_counted() {
        let mut s = Session::new(SessionMode::Results, 2);
        s.groups.insert("Research".into(), vec![item(1, "https://a.example")]);
        s.groups.insert(UNCLASSIFIED.into(), vec![item(2, "https://b.example")]);
        s.classified_count = 1;
        assert!(s.verify().is_empty(), "{:?}", s.verify());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut s = Session::new(SessionMode::Launchpad, 1);
        s.groups.insert("Research".into(), vec![item(1, "https://a.example")]);
        s.classified_count = 1;
        s.narrative = "one tab".into();

        let json = serde_json::to_string_pretty(&s).unwrap();
        assert!(json.contains("\"totalTabs\": 1"));
        assert!(json.contains("\"launchpad\""));

        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_tabs, 1);
        assert_eq!(back.classified_count, 1);
        assert_eq!(back.mode, SessionMode::Launchpad);
        assert_eq!(back.id(), s.id());
    }
}

//! Preference store
//!
//! Learned domain-level classification rules, persisted in
//! `learned-rules.json`. Rules enter as suggestions from the correction
//! analyzer and only take effect once the user approves them. Rejected
//! suggestion ids are remembered so the same suggestion is never resurfaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::fsutil::{read_json_or_default, write_json};

/// Aggregate numbers behind a suggested rule
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub corrections: u32,
    pub agreement_ratio: f64,
    pub top_target: String,
}

/// One correction that contributed to a rule suggestion
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSample {
    pub session_id: String,
    pub url: String,
    pub from: String,
    pub to: String,
}

/// A learned classification preference, keyed to a domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRule {
    pub id: String,
    pub domain: String,
    /// Natural-language rule text injected into the classification prompt
    pub rule: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub stats: RuleStats,
    #[serde(default)]
    pub source_corrections: Vec<CorrectionSample>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub application_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,
}

impl Default for PreferenceRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            domain: String::new(),
            rule: String::new(),
            approved: false,
            confidence: 0.0,
            stats: RuleStats::default(),
            source_corrections: Vec::new(),
            created_at: DateTime::UNIX_EPOCH,
            approved_at: None,
            application_count: 0,
            last_applied_at: None,
        }
    }
}

/// On-disk shape of `learned-rules.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedRulesFile {
    #[serde(default)]
    pub rules: Vec<PreferenceRule>,
    /// Suggestion ids the user rejected; blocks resurfacing
    #[serde(default)]
    pub rejected: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    1
}

impl Default for LearnedRulesFile {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            rejected: Vec::new(),
            version: default_version(),
            last_updated: None,
        }
    }
}

/// File-backed store of learned preference rules
pub struct PreferenceStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl PreferenceStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opened preference store");
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    /// Read the whole file; missing file yields the empty default
    pub fn load(&self) -> eyre::Result<LearnedRulesFile> {
        read_json_or_default(&self.path)
    }

    fn store(&self, mut file: LearnedRulesFile) -> eyre::Result<()> {
        file.last_updated = Some(Utc::now());
        write_json(&self.path, &file)
    }

    /// Rules where `approved = true`
    pub fn get_approved_rules(&self) -> eyre::Result<Vec<PreferenceRule>> {
        Ok(self.load()?.rules.into_iter().filter(|r| r.approved).collect())
    }

    /// Ids that must not be suggested again: every stored rule plus every
    /// rejected id
    pub fn known_ids(&self) -> eyre::Result<Vec<String>> {
        let file = self.load()?;
        let mut ids: Vec<String> = file.rules.iter().map(|r| r.id.clone()).collect();
        ids.extend(file.rejected);
        Ok(ids)
    }

    /// Persist a rule as approved. An existing rule with the same id is
    /// updated in place; otherwise the rule is added.
    pub fn approve_rule(&self, mut rule: PreferenceRule) -> eyre::Result<PreferenceRule> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;

        rule.approved = true;
        rule.approved_at = Some(Utc::now());

        match file.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => {
                existing.approved = true;
                existing.approved_at = rule.approved_at;
                existing.rule = rule.rule.clone();
                existing.confidence = rule.confidence;
                rule = existing.clone();
            }
            None => file.rules.push(rule.clone()),
        }

        self.store(file)?;
        info!(rule = %rule.id, domain = %rule.domain, "Approved preference rule");
        Ok(rule)
    }

    /// Reject a suggestion id. Any stored unapproved rule with that id is
    /// dropped, and the id is remembered so it never resurfaces.
    pub fn reject_rule(&self, id: &str) -> eyre::Result<()> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;

        file.rules.retain(|r| r.id != id || r.approved);
        if !file.rejected.iter().any(|r| r == id) {
            file.rejected.push(id.to_string());
        }

        self.store(file)?;
        info!(rule = %id, "Rejected preference rule");
        Ok(())
    }

    /// Withdraw approval without forgetting the rule
    pub fn unapprove_rule(&self, id: &str) -> eyre::Result<bool> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;

        let mut found = false;
        if let Some(rule) = file.rules.iter_mut().find(|r| r.id == id) {
            rule.approved = false;
            rule.approved_at = None;
            found = true;
        }
        if found {
            self.store(file)?;
        }
        Ok(found)
    }

    /// Bump application counters for rules that matched a capture
    pub fn increment_applications(&self, ids: &[String]) -> eyre::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;

        let now = Utc::now();
        for rule in file.rules.iter_mut() {
            if ids.iter().any(|id| *id == rule.id) {
                rule.application_count += 1;
                rule.last_applied_at = Some(now);
            }
        }

        self.store(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn suggestion(domain: &str) -> PreferenceRule {
        PreferenceRule {
            id: format!("pref-{domain}"),
            domain: domain.to_string(),
            rule: format!("Classify {domain} as Shopping"),
            confidence: 0.8,
            created_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_loads_default() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));
        let file = store.load().unwrap();
        assert!(file.rules.is_empty());
        assert_eq!(file.version, 1);
    }

    #[test]
    fn test_approve_then_get_approved() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));

        let approved = store.approve_rule(suggestion("example.com")).unwrap();
        assert!(approved.approved);
        assert!(approved.approved_at.is_some());

        let rules = store.get_approved_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].domain, "example.com");
    }

    #[test]
    fn test_reject_blocks_resurfacing() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));

        store.reject_rule("pref-example.com").unwrap();
        store.reject_rule("pref-example.com").unwrap(); // idempotent

        let known = store.known_ids().unwrap();
        assert_eq!(known, vec!["pref-example.com".to_string()]);
    }

    #[test]
    fn test_unapprove_keeps_rule() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));

        store.approve_rule(suggestion("example.com")).unwrap();
        assert!(store.unapprove_rule("pref-example.com").unwrap());

        assert!(store.get_approved_rules().unwrap().is_empty());
        assert_eq!(store.load().unwrap().rules.len(), 1);
        assert!(!store.unapprove_rule("pref-missing").unwrap());
    }

    #[test]
    fn test_increment_applications() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));

        store.approve_rule(suggestion("example.com")).unwrap();
        store
            .increment_applications(&["pref-example.com".to_string(), "pref-unknown".to_string()])
            .unwrap();

        let rules = store.get_approved_rules().unwrap();
        assert_eq!(rules[0].application_count, 1);
        assert!(rules[0].last_applied_at.is_some());
    }

    #[test]
    fn test_last_updated_stamped() {
        let temp = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp.path().join("learned-rules.json"));
        store.approve_rule(suggestion("example.com")).unwrap();
        assert!(store.load().unwrap().last_updated.is_some());
    }
}

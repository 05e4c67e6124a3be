//! Domain rules
//!
//! Coarse per-hostname classification signals. Unlike preferences these are
//! not prompt text: they mark a whole domain as noise, always interesting,
//! or contextual, and feed the attribution layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::fsutil::{read_json_or_default, write_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainRuleSignal {
    Noise,
    AlwaysInteresting,
    Contextual,
}

impl std::fmt::Display for DomainRuleSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Noise => "noise",
            Self::AlwaysInteresting => "always-interesting",
            Self::Contextual => "contextual",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainRuleSource {
    User,
    Bootstrapped,
}

impl std::fmt::Display for DomainRuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Bootstrapped => write!(f, "bootstrapped"),
        }
    }
}

/// One rule, keyed by hostname in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRule {
    pub signal: DomainRuleSignal,
    pub reason: String,
    pub source: DomainRuleSource,
    pub at: DateTime<Utc>,
}

/// On-disk shape of `domain-rules.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomainRulesFile {
    #[serde(default)]
    pub rules: BTreeMap<String, DomainRule>,
    #[serde(default)]
    pub bootstrapped: bool,
}

/// Hosts seeded on first use; the user overrides from there
const BOOTSTRAP_RULES: &[(&str, DomainRuleSignal, &str)] = &[
    ("pinterest.com", DomainRuleSignal::Noise, "image drift, rarely intentional"),
    ("facebook.com", DomainRuleSignal::Noise, "ambient feed"),
    ("github.com", DomainRuleSignal::AlwaysInteresting, "active work artifacts"),
    ("arxiv.org", DomainRuleSignal::AlwaysInteresting, "papers get read or filed"),
    ("news.ycombinator.com", DomainRuleSignal::Contextual, "signal or drift depending on session"),
    ("youtube.com", DomainRuleSignal::Contextual, "tutorials vs entertainment"),
];

/// File-backed store of domain rules
pub struct DomainRuleStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl DomainRuleStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opened domain rule store");
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    /// All rules, bootstrapping the seed set on first load
    pub fn load(&self) -> eyre::Result<BTreeMap<String, DomainRule>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file: DomainRulesFile = read_json_or_default(&self.path)?;

        if !file.bootstrapped {
            let now = Utc::now();
            for (host, signal, reason) in BOOTSTRAP_RULES {
                file.rules.entry(host.to_string()).or_insert(DomainRule {
                    signal: *signal,
                    reason: reason.to_string(),
                    source: DomainRuleSource::Bootstrapped,
                    at: now,
                });
            }
            file.bootstrapped = true;
            write_json(&self.path, &file)?;
            info!(count = file.rules.len(), "Bootstrapped domain rules");
        }

        Ok(file.rules)
    }

    /// Set or replace the rule for a hostname (user-sourced)
    pub fn set_rule(&self, host: &str, signal: DomainRuleSignal, reason: &str) -> eyre::Result<DomainRule> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file: DomainRulesFile = read_json_or_default(&self.path)?;

        let rule = DomainRule {
            signal,
            reason: reason.to_string(),
            source: DomainRuleSource::User,
            at: Utc::now(),
        };
        file.rules.insert(host.to_lowercase(), rule.clone());
        write_json(&self.path, &file)?;

        info!(%host, signal = %rule.signal, "Set domain rule");
        Ok(rule)
    }
}

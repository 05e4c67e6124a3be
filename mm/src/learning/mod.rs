//! Learning loop: corrections, preferences, domain rules
//!
//! Reads disposition logs across sessions, detects per-domain regroup
//! patterns, and maintains the user-approved rule state that feeds back into
//! future classifications.

mod corrections;
mod domain_rules;
mod preferences;

pub use corrections::{
    Correction, CorrectionAnalyzer, DomainCorrections, DomainRate, ExtractorSuggestion, suggestion_id,
};
pub use domain_rules::{DomainRule, DomainRuleSignal, DomainRuleSource, DomainRuleStore, DomainRulesFile};
pub use preferences::{CorrectionSample, LearnedRulesFile, PreferenceRule, PreferenceStore, RuleStats};

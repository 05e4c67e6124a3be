//! Classification context: project block and learned-preference injection

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Project, Tab};
use super::categories::project_category_label;
use crate::learning::PreferenceRule;

/// A preference rule together with the tabs it matched in this capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPreference {
    pub rule_id: String,
    pub domain: String,
    /// 1-based indices of the tabs whose host matched the rule's domain
    pub matched_tab_indices: Vec<u32>,
}

/// Human-readable context block pairing each active project with its
/// keywords and synthesized category label. Empty when no projects.
pub fn context_block(projects: &[Project]) -> String {
    if projects.is_empty() {
        return String::new();
    }
    let mut lines = vec!["The user is actively working on these projects:".to_string()];
    for p in projects {
        let keywords = if p.keywords.is_empty() {
            String::new()
        } else {
            format!(" (keywords: {})", p.keywords.join(", "))
        };
        lines.push(format!("- {}{} -> category \"{}\"", p.name, keywords, project_category_label(p)));
    }
    lines.join("\n")
}

/// Extract the hostname from a URL, lowercased. No external URL crate: strip
/// the scheme, optional userinfo, then cut at the first delimiter.
pub fn hostname(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
    let host: String = rest
        .chars()
        .take_while(|c| !matches!(c, '/' | ':' | '?' | '#'))
        .collect();
    if host.is_empty() || !host.contains('.') {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// True when `host` is the rule domain itself or a subdomain of it
pub fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Walk the capture and find, for each rule with a domain, the tabs it
/// applies to. Rules without matches still get injected into the prompt for
/// general guidance; only matching rules come back as applied.
pub fn match_preferences(rules: &[PreferenceRule], tabs: &[Tab]) -> Vec<AppliedPreference> {
    let mut applied = Vec::new();
    for rule in rules {
        if rule.domain.is_empty() {
            continue;
        }
        let matched: Vec<u32> = tabs
            .iter()
            .enumerate()
            .filter(|(_, tab)| {
                hostname(&tab.url)
                    .map(|h| domain_matches(&h, &rule.domain))
                    .unwrap_or(false)
            })
            .map(|(i, _)| i as u32 + 1)
            .collect();
        if !matched.is_empty() {
            debug!(rule = %rule.id, domain = %rule.domain, tabs = ?matched, "Preference matched capture");
            applied.push(AppliedPreference {
                rule_id: rule.id.clone(),
                domain: rule.domain.clone(),
                matched_tab_indices: matched,
            });
        }
    }
    applied
}

/// Prompt lines for every approved rule, matched or not
pub fn preference_lines(rules: &[PreferenceRule]) -> String {
    rules
        .iter()
        .map(|r| {
            if r.domain.is_empty() {
                format!("- {}", r.rule)
            } else {
                format!("- [{}] {}", r.domain, r.rule)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

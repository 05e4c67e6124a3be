//! Debug-mode attribution
//!
//! Deterministic explanation chains for each classified tab: which project
//! keywords and domain signals would have pulled it where. Diagnostic only;
//! never feeds back into the classification itself.

use serde::Serialize;
use std::collections::BTreeMap;

use super::context::hostname;
use super::{Project, Tab};
use crate::learning::DomainRule;

/// Small fixed list of domain signals recognized without any learned state
const BUILTIN_DOMAIN_SIGNALS: &[(&str, &str)] = &[
    ("github.com", "development"),
    ("stackoverflow.com", "development"),
    ("arxiv.org", "academic"),
    ("scholar.google.com", "academic"),
    ("wikipedia.org", "reference"),
    ("youtube.com", "entertainment"),
    ("reddit.com", "social"),
    ("twitter.com", "social"),
    ("x.com", "social"),
    ("amazon.com", "commerce"),
    ("news.ycombinator.com", "news"),
];

/// Attribution chain for one tab
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub tab_index: u32,
    pub chain: Vec<String>,
}

/// Compute attribution chains for every tab
pub fn attribute(tabs: &[Tab], projects: &[Project], domain_rules: &BTreeMap<String, DomainRule>) -> Vec<Attribution> {
    tabs.iter()
        .enumerate()
        .map(|(i, tab)| {
            let mut chain = Vec::new();
            let title = tab.title.to_lowercase();
            let content = tab.content.to_lowercase();

            for project in projects {
                for keyword in &project.keywords {
                    let kw = keyword.to_lowercase();
                    if title.contains(&kw) {
                        chain.push(format!("keyword {kw:?} in title -> project {:?}", project.name));
                    } else if content.contains(&kw) {
                        chain.push(format!("keyword {kw:?} in content -> project {:?}", project.name));
                    }
                }
            }

            if let Some(host) = hostname(&tab.url) {
                for (domain, signal) in BUILTIN_DOMAIN_SIGNALS {
                    if host == *domain || host.ends_with(&format!(".{domain}")) {
                        chain.push(format!("domain {domain} -> {signal} signal"));
                    }
                }
                if let Some(rule) = domain_rules.get(&host) {
                    chain.push(format!("domain rule ({}): {} -> {}", rule.source, host, rule.signal));
                }
            }

            Attribution {
                tab_index: i as u32 + 1,
                chain,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{DomainRuleSignal, DomainRuleSource};
    use chrono::Utc;

    fn tab(url: &str, title: &str) -> Tab {
        Tab {
            url: url.to_string(),
            title: title.to_string(),
            content: String::new(),
            needs_visual_extraction: false,
        }
    }

    #[test]
    fn test_project_keyword_in_title() {
        let projects = vec![Project {
            name: "thesis".into(),
            keywords: vec!["authorship".into()],
            category_type: None,
        }];
        let tabs = vec![tab("https://blog.example.net", "Notes on Authorship")];
        let chains = attribute(&tabs, &projects, &BTreeMap::new());
        assert_eq!(chains.len(), 1);
        assert!(chains[0].chain[0].contains("authorship"));
        assert!(chains[0].chain[0].contains("thesis"));
    }

    #[test]
    fn test_builtin_domain_signal() {
        let tabs = vec![tab("https://github.com/rust-lang/rust", "rust")];
        let chains = attribute(&tabs, &[], &BTreeMap::new());
        assert!(chains[0].chain.iter().any(|c| c.contains("development")));
    }

    #[test]
    fn test_domain_rule_included() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "pinterest.com".to_string(),
            DomainRule {
                signal: DomainRuleSignal::Noise,
                reason: "never useful".into(),
                source: DomainRuleSource::User,
                at: Utc::now(),
            },
        );
        let tabs = vec![tab("https://pinterest.com/board", "pins")];
        let chains = attribute(&tabs, &[], &rules);
        assert!(chains[0].chain.iter().any(|c| c.contains("noise")));
    }

    #[test]
    fn test_empty_chain_for_unremarkable_tab() {
        let tabs = vec![tab("https://plain.example.org", "hello")];
        let chains = attribute(&tabs, &[], &BTreeMap::new());
        assert!(chains[0].chain.is_empty());
    }
}

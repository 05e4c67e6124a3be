//! Correction analyzer
//!
//! Mines `regroup` dispositions across every stored session and turns
//! repeated per-domain corrections into candidate preference rules for the
//! user to approve.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use sessionstore::{DispositionAction, SessionStore};

use super::preferences::{CorrectionSample, PreferenceRule, PreferenceStore, RuleStats};
use crate::classify::hostname;

/// Minimum share of corrections that must agree on one target category
const MIN_AGREEMENT_RATIO: f64 = 0.6;

/// One observed regroup, resolved back to its tab
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
    pub item_id: String,
}

/// Correction distribution for one domain
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomainCorrections {
    pub total_corrections: u32,
    pub from_counts: BTreeMap<String, u32>,
    pub to_counts: BTreeMap<String, u32>,
    pub corrections: Vec<Correction>,
}

/// Correction rate for one domain
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRate {
    pub domain: String,
    pub correction_count: u32,
    pub total_tabs: u32,
    pub rate: f64,
}

/// A domain that keeps getting misread and likely needs extraction hints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorSuggestion {
    pub domain: String,
    pub correction_count: u32,
    pub rate: f64,
    pub suggested_selectors: Vec<String>,
}

/// Reads disposition logs across sessions and derives rule suggestions
pub struct CorrectionAnalyzer<'a> {
    store: &'a SessionStore,
}

impl<'a> CorrectionAnalyzer<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    /// Every regroup across every session, resolved to its tab.
    /// Regroups whose item cannot be found (or has no URL) are skipped with
    /// a warning; they carry no domain signal.
    pub fn get_corrections(&self) -> eyre::Result<Vec<Correction>> {
        let mut corrections = Vec::new();

        for (session_id, session) in self.store.load_all()? {
            for d in &session.dispositions {
                if d.action != DispositionAction::Regroup {
                    continue;
                }
                let Some((_, item)) = session.find_item(&d.item_id) else {
                    warn!(%session_id, item = %d.item_id, "Regroup references unknown item");
                    continue;
                };
                let Some(domain) = hostname(&item.url) else {
                    continue;
                };
                corrections.push(Correction {
                    session_id: session_id.clone(),
                    timestamp: session.timestamp,
                    url: item.url.clone(),
                    domain,
                    title: item.title.clone(),
                    from: d.from.clone().unwrap_or_default(),
                    to: d.to.clone().unwrap_or_default(),
                    at: d.at,
                    item_id: d.item_id.clone(),
                });
            }
        }

        debug!(count = corrections.len(), "Collected corrections");
        Ok(corrections)
    }

    /// Group corrections by domain with from/to distributions
    pub fn aggregate_by_domain(&self, corrections: &[Correction]) -> BTreeMap<String, DomainCorrections> {
        let mut by_domain: BTreeMap<String, DomainCorrections> = BTreeMap::new();
        for c in corrections {
            let entry = by_domain.entry(c.domain.clone()).or_default();
            entry.total_corrections += 1;
            *entry.from_counts.entry(c.from.clone()).or_default() += 1;
            *entry.to_counts.entry(c.to.clone()).or_default() += 1;
            entry.corrections.push(c.clone());
        }
        by_domain
    }

    /// Corrections per tab observed, for domains seen at least twice
    pub fn get_correction_rates(&self) -> eyre::Result<Vec<DomainRate>> {
        let corrections = self.get_corrections()?;
        let by_domain = self.aggregate_by_domain(&corrections);

        let mut tabs_per_domain: BTreeMap<String, u32> = BTreeMap::new();
        for (_, session) in self.store.load_all()? {
            for (_, item) in session.items() {
                if let Some(domain) = hostname(&item.url) {
                    *tabs_per_domain.entry(domain).or_default() += 1;
                }
            }
        }

        let mut rates: Vec<DomainRate> = tabs_per_domain
            .into_iter()
            .filter(|(_, total)| *total >= 2)
            .map(|(domain, total_tabs)| {
                let correction_count = by_domain.get(&domain).map(|d| d.total_corrections).unwrap_or(0);
                DomainRate {
                    rate: correction_count as f64 / total_tabs as f64,
                    domain,
                    correction_count,
                    total_tabs,
                }
            })
            .collect();

        rates.sort_by(|a, b| b.rate.partial_cmp(&a.rate).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rates)
    }

    /// Domains misread often enough that better content extraction, not a
    /// rule, is the likely fix
    pub fn suggest_extractors(&self, min_corrections: u32, min_rate: f64) -> eyre::Result<Vec<ExtractorSuggestion>> {
        Ok(self
            .get_correction_rates()?
            .into_iter()
            .filter(|r| r.correction_count >= min_corrections && r.rate >= min_rate)
            .map(|r| ExtractorSuggestion {
                domain: r.domain,
                correction_count: r.correction_count,
                rate: r.rate,
                suggested_selectors: vec!["article".to_string(), "main".to_string(), "h1".to_string()],
            })
            .collect())
    }

    /// Candidate preference rules from repeated, agreeing corrections.
    ///
    /// A domain qualifies when it has at least `min_corrections` regroups,
    /// at least 60% of them agree on one target, and the domain has not
    /// already been suggested (approved, pending, or rejected).
    pub fn generate_rule_suggestions(
        &self,
        preferences: &PreferenceStore,
        min_corrections: u32,
    ) -> eyre::Result<Vec<PreferenceRule>> {
        let corrections = self.get_corrections()?;
        let by_domain = self.aggregate_by_domain(&corrections);
        let known = preferences.known_ids()?;

        let mut suggestions = Vec::new();
        for (domain, agg) in by_domain {
            let id = suggestion_id(&domain);
            if known.iter().any(|k| *k == id) {
                continue;
            }
            if agg.total_corrections < min_corrections {
                continue;
            }

            let Some((target, target_count)) = agg
                .to_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            else {
                continue;
            };
            let agreement = *target_count as f64 / agg.total_corrections as f64;
            if agreement < MIN_AGREEMENT_RATIO {
                continue;
            }

            let rule_text = rule_text(&domain, target, &agg);

            suggestions.push(PreferenceRule {
                id,
                domain: domain.clone(),
                rule: rule_text,
                approved: false,
                confidence: agreement,
                stats: RuleStats {
                    corrections: agg.total_corrections,
                    agreement_ratio: agreement,
                    top_target: target.clone(),
                },
                source_corrections: agg
                    .corrections
                    .iter()
                    .take(3)
                    .map(|c| CorrectionSample {
                        session_id: c.session_id.clone(),
                        url: c.url.clone(),
                        from: c.from.clone(),
                        to: c.to.clone(),
                    })
                    .collect(),
                created_at: Utc::now(),
                approved_at: None,
                application_count: 0,
                last_applied_at: None,
            });
        }

        suggestions.sort_by(|a, b| {
            let ka = a.confidence * a.stats.corrections as f64;
            let kb = b.confidence * b.stats.corrections as f64;
            kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(count = suggestions.len(), "Generated rule suggestions");
        Ok(suggestions)
    }
}

/// Deterministic suggestion id per domain, so rejections stick
pub fn suggestion_id(domain: &str) -> String {
    format!("pref-{domain}")
}

fn rule_text(domain: &str, target: &str, agg: &DomainCorrections) -> String {
    let mut mis_targets: Vec<&str> = agg
        .from_counts
        .keys()
        .map(String::as_str)
        .filter(|f| *f != target && !f.is_empty())
        .collect();
    mis_targets.sort_unstable();

    let mut text = if mis_targets.is_empty() {
        format!("Classify tabs from {domain} as {target}")
    } else {
        format!("Classify tabs from {domain} as {target}, not {}", mis_targets.join(" or "))
    };

    // path-segment exceptions: a segment corrected twice toward a different,
    // consistent target earns its own clause
    let mut by_segment: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for c in &agg.corrections {
        if let Some(segment) = first_path_segment(&c.url) {
            by_segment.entry(segment).or_default().push(c.to.as_str());
        }
    }
    for (segment, targets) in by_segment {
        if targets.len() >= 2 {
            let first = targets[0];
            if first != target && targets.iter().all(|t| *t == first) {
                text.push_str(&format!("; except /{segment} pages, which belong in {first}"));
            }
        }
    }

    text
}

fn first_path_segment(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let path = rest.split_once('/')?.1;
    let segment: String = path.chars().take_while(|c| !matches!(c, '/' | '?' | '#')).collect();
    if segment.is_empty() { None } else { Some(segment) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionstore::{GroupItem, NewDisposition, Session, SessionMode};
    use tempfile::TempDir;

    fn save_session_with_regroups(store: &SessionStore, urls_and_moves: &[(&str, &str, &str)], offset_hours: i64) {
        let mut s = Session::new(SessionMode::Results, urls_and_moves.len() as u32);
        s.timestamp = s.timestamp - chrono::Duration::hours(offset_hours);
        for (i, (url, from, _)) in urls_and_moves.iter().enumerate() {
            s.groups.entry(from.to_string()).or_default().push(GroupItem {
                tab_index: i as u32 + 1,
                title: format!("tab {i}"),
                url: url.to_string(),
            });
        }
        s.classified_count = urls_and_moves.len() as u32;
        let id = store.save(&mut s).unwrap();

        for (url, from, to) in urls_and_moves {
            let mut d = NewDisposition::new(DispositionAction::Regroup, *url);
            d.from = Some(from.to_string());
            d.to = Some(to.to_string());
            store.append_disposition(&id, d).unwrap();
        }
    }

    #[test]
    fn test_corrections_resolved_to_domain() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(&store, &[("https://example.com/a", "Research", "Shopping")], 0);

        let analyzer = CorrectionAnalyzer::new(&store);
        let corrections = analyzer.get_corrections().unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].domain, "example.com");
        assert_eq!(corrections[0].from, "Research");
        assert_eq!(corrections[0].to, "Shopping");
    }

    #[test]
    fn test_rule_suggestion_scenario() {
        // three regroups toward Shopping on one domain: agreement 1.0
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(
            &store,
            &[
                ("https://example.com/a", "Research", "Shopping"),
                ("https://example.com/b", "Research", "Shopping"),
            ],
            2,
        );
        save_session_with_regroups(&store, &[("https://example.com/c", "Shopping", "Shopping")], 1);

        let analyzer = CorrectionAnalyzer::new(&store);
        let prefs = PreferenceStore::open(temp.path().join("learned-rules.json"));
        let suggestions = analyzer.generate_rule_suggestions(&prefs, 2).unwrap();

        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.domain, "example.com");
        assert_eq!(s.stats.top_target, "Shopping");
        assert!((s.confidence - 1.0).abs() < f64::EPSILON);
        assert!(s.rule.contains("Shopping"));
        assert!(s.rule.contains("not Research"));
    }

    #[test]
    fn test_low_agreement_suppresses_suggestion() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(
            &store,
            &[
                ("https://example.com/a", "Research", "Shopping"),
                ("https://example.com/b", "Research", "News"),
            ],
            0,
        );

        let analyzer = CorrectionAnalyzer::new(&store);
        let prefs = PreferenceStore::open(temp.path().join("learned-rules.json"));
        let suggestions = analyzer.generate_rule_suggestions(&prefs, 2).unwrap();
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_rejected_domain_not_resurfaced() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(
            &store,
            &[
                ("https://example.com/a", "Research", "Shopping"),
                ("https://example.com/b", "Research", "Shopping"),
            ],
            0,
        );

        let analyzer = CorrectionAnalyzer::new(&store);
        let prefs = PreferenceStore::open(temp.path().join("learned-rules.json"));
        prefs.reject_rule(&suggestion_id("example.com")).unwrap();

        let suggestions = analyzer.generate_rule_suggestions(&prefs, 2).unwrap();
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_path_segment_exception() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(
            &store,
            &[
                ("https://example.com/shop/a", "Research", "Shopping"),
                ("https://example.com/shop/b", "Research", "Shopping"),
                ("https://example.com/blog/a", "Research", "News"),
                ("https://example.com/blog/b", "Research", "News"),
                ("https://example.com/shop/c", "Research", "Shopping"),
            ],
            0,
        );

        let analyzer = CorrectionAnalyzer::new(&store);
        let prefs = PreferenceStore::open(temp.path().join("learned-rules.json"));
        let suggestions = analyzer.generate_rule_suggestions(&prefs, 2).unwrap();

        assert_eq!(suggestions.len(), 1);
        let rule = &suggestions[0].rule;
        assert!(rule.contains("Shopping"), "{rule}");
        assert!(rule.contains("except /blog"), "{rule}");
        assert!(rule.contains("News"), "{rule}");
    }

    #[test]
    fn test_correction_rates_need_two_tabs() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        // two tabs from example.com, one corrected; single tab from other.org
        save_session_with_regroups(&store, &[("https://example.com/a", "Research", "Shopping")], 2);
        let mut s = Session::new(SessionMode::Results, 2);
        s.groups.insert(
            "Research".into(),
            vec![
                GroupItem {
                    tab_index: 1,
                    title: "x".into(),
                    url: "https://example.com/b".into(),
                },
                GroupItem {
                    tab_index: 2,
                    title: "y".into(),
                    url: "https://other.org/only".into(),
                },
            ],
        );
        s.classified_count = 2;
        store.save(&mut s).unwrap();

        let analyzer = CorrectionAnalyzer::new(&store);
        let rates = analyzer.get_correction_rates().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].domain, "example.com");
        assert_eq!(rates[0].total_tabs, 2);
        assert_eq!(rates[0].correction_count, 1);
        assert!((rates[0].rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_suggest_extractors_thresholds() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save_session_with_regroups(
            &store,
            &[
                ("https://example.com/a", "Research", "Shopping"),
                ("https://example.com/b", "Research", "News"),
            ],
            0,
        );

        let analyzer = CorrectionAnalyzer::new(&store);
        let extractors = analyzer.suggest_extractors(2, 0.3).unwrap();
        assert_eq!(extractors.len(), 1);
        assert_eq!(extractors[0].domain, "example.com");
        assert!(!extractors[0].suggested_selectors.is_empty());
    }
}

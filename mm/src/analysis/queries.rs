//! Longitudinal queries
//!
//! Recurring-unfinished detection, project health, and the distraction
//! signature, all computed from the flattened [`Aggregate`].

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use sessionstore::{ItemStatus, SessionMode};

use super::aggregator::Aggregate;

/// Categories counted as distraction signal
pub const DISTRACTION_CATEGORIES: [&str; 4] = ["Social Media", "Entertainment", "News", "Shopping"];

/// Parse a time-range string (`all`, `week`, `month`, `<N>d`) into a cutoff
pub fn parse_time_range(range: &str) -> Option<Duration> {
    match range {
        "all" | "" => None,
        "week" => Some(Duration::days(7)),
        "month" => Some(Duration::days(30)),
        other => other
            .strip_suffix('d')
            .and_then(|n| n.parse::<i64>().ok())
            .map(Duration::days),
    }
}

/// A URL that keeps coming back without ever being completed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTab {
    pub url: String,
    pub title: String,
    /// Distinct sessions the URL appeared in
    pub times_seen: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Average days between successive occurrences
    pub avg_gap_days: f64,
    pub sessions: Vec<String>,
}

/// Ghost-tab query: URLs seen in at least `min_occurrences` distinct
/// sessions and never completed in any of them.
pub fn get_recurring_unfinished(agg: &Aggregate, min_occurrences: u32, time_range: &str) -> Vec<RecurringTab> {
    let cutoff = parse_time_range(time_range).map(|d| Utc::now() - d);

    let mut recurring = Vec::new();
    for url in agg.by_url.keys() {
        let occurrences: Vec<_> = agg
            .occurrences_for_url(url)
            .into_iter()
            .filter(|o| cutoff.map(|c| o.session_timestamp >= c).unwrap_or(true))
            .collect();
        if occurrences.is_empty() {
            continue;
        }
        if occurrences.iter().any(|o| o.disposition == Some(ItemStatus::Completed)) {
            continue;
        }

        let mut session_times: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
        for o in &occurrences {
            session_times.insert(o.session_id.as_str(), o.session_timestamp);
        }
        if (session_times.len() as u32) < min_occurrences {
            continue;
        }

        let mut times: Vec<DateTime<Utc>> = session_times.values().copied().collect();
        times.sort();
        let gaps: Vec<f64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64 / 86_400.0)
            .collect();
        let avg_gap_days = if gaps.is_empty() {
            0.0
        } else {
            gaps.iter().sum::<f64>() / gaps.len() as f64
        };

        recurring.push(RecurringTab {
            url: url.clone(),
            title: occurrences.last().map(|o| o.title.clone()).unwrap_or_default(),
            times_seen: session_times.len() as u32,
            first_seen: *times.first().expect("non-empty"),
            last_seen: *times.last().expect("non-empty"),
            avg_gap_days,
            sessions: session_times.keys().map(|s| s.to_string()).collect(),
        });
    }

    recurring.sort_by(|a, b| b.times_seen.cmp(&a.times_seen).then(a.url.cmp(&b.url)));
    debug!(count = recurring.len(), "Recurring unfinished computed");
    recurring
}

/// Project activity status by days since last sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Cooling,
    Neglected,
    Abandoned,
}

impl ProjectStatus {
    fn from_days(days: i64) -> Self {
        match days {
            d if d <= 3 => Self::Active,
            d if d <= 14 => Self::Cooling,
            d if d <= 30 => Self::Neglected,
            _ => Self::Abandoned,
        }
    }
}

/// Health report row for one project
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHealth {
    pub project: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_sessions: u32,
    pub total_tabs: u32,
    pub days_since_active: i64,
    pub status: ProjectStatus,
}

/// Per-project aggregation, most recently active first
pub fn get_project_health(agg: &Aggregate, include_abandoned: bool) -> Vec<ProjectHealth> {
    let now = Utc::now();
    let mut health: Vec<ProjectHealth> = agg
        .by_project
        .iter()
        .filter(|(_, sightings)| !sightings.is_empty())
        .map(|(project, sightings)| {
            let first_seen = sightings.iter().map(|s| s.timestamp).min().expect("non-empty");
            let last_seen = sightings.iter().map(|s| s.timestamp).max().expect("non-empty");
            let days_since_active = (now - last_seen).num_days();
            ProjectHealth {
                project: project.clone(),
                first_seen,
                last_seen,
                total_sessions: sightings.len() as u32,
                total_tabs: sightings.iter().map(|s| s.tab_count).sum(),
                days_since_active,
                status: ProjectStatus::from_days(days_since_active),
            }
        })
        .filter(|h| include_abandoned || h.status != ProjectStatus::Abandoned)
        .collect();

    health.sort_by(|a, b| a.days_since_active.cmp(&b.days_since_active).then(a.project.cmp(&b.project)));
    health
}

/// Aggregated distraction profile
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DistractionSignature {
    pub total_tabs: u32,
    pub by_domain: BTreeMap<String, u32>,
    pub by_hour: [u32; 24],
    pub by_day: [u32; 7],
    pub by_mode: BTreeMap<String, u32>,
    pub peak_hour: Option<u32>,
    /// 0-6, Sunday through Saturday
    pub peak_day: Option<u32>,
}

/// Where and when distraction categories show up
pub fn get_distraction_signature(
    agg: &Aggregate,
    time_range: &str,
    mode_filter: Option<SessionMode>,
) -> DistractionSignature {
    let cutoff = parse_time_range(time_range).map(|d| Utc::now() - d);
    let distraction: BTreeSet<&str> = DISTRACTION_CATEGORIES.into_iter().collect();

    let mut signature = DistractionSignature::default();
    for occurrence in &agg.occurrences {
        if !distraction.contains(occurrence.category.as_str()) {
            continue;
        }
        if let Some(c) = cutoff
            && occurrence.session_timestamp < c
        {
            continue;
        }
        if let Some(mode) = mode_filter
            && occurrence.session_mode != mode
        {
            continue;
        }

        signature.total_tabs += 1;
        if let Some(domain) = crate::classify::hostname(&occurrence.url) {
            *signature.by_domain.entry(domain).or_default() += 1;
        }
        signature.by_hour[occurrence.session_timestamp.hour() as usize] += 1;
        signature.by_day[occurrence.session_timestamp.weekday().num_days_from_sunday() as usize] += 1;
        *signature.by_mode.entry(occurrence.session_mode.to_string()).or_default() += 1;
    }

    signature.peak_hour = peak(&signature.by_hour);
    signature.peak_day = peak(&signature.by_day);
    signature
}

fn peak(counts: &[u32]) -> Option<u32> {
    let (idx, max) = counts.iter().enumerate().max_by_key(|(_, c)| **c)?;
    (*max > 0).then_some(idx as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionstore::{DispositionAction, GroupItem, NewDisposition, Session, SessionStore};
    use tempfile::TempDir;

    fn save(store: &SessionStore, urls: &[(&str, &str)], days_ago: i64, mode: SessionMode) -> String {
        let mut s = Session::new(mode, urls.len() as u32);
        s.timestamp = s.timestamp - chrono::Duration::days(days_ago);
        for (i, (url, category)) in urls.iter().enumerate() {
            s.groups.entry(category.to_string()).or_default().push(GroupItem {
                tab_index: i as u32 + 1,
                title: format!("tab {i}"),
                url: url.to_string(),
            });
        }
        s.classified_count = urls.len() as u32;
        store.save(&mut s).unwrap()
    }

    #[test]
    fn test_parse_time_range() {
        assert!(parse_time_range("all").is_none());
        assert_eq!(parse_time_range("week"), Some(Duration::days(7)));
        assert_eq!(parse_time_range("month"), Some(Duration::days(30)));
        assert_eq!(parse_time_range("14d"), Some(Duration::days(14)));
        assert!(parse_time_range("yesterday").is_none());
    }

    #[test]
    fn test_recurring_unfinished_detects_ghosts() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save(&store, &[("https://ghost.example/a", "Research")], 10, SessionMode::Results);
        save(&store, &[("https://ghost.example/a", "Research")], 4, SessionMode::Results);
        save(&store, &[("https://once.example/b", "Research")], 2, SessionMode::Results);

        let agg = Aggregate::load(&store).unwrap();
        let recurring = get_recurring_unfinished(&agg, 2, "all");
        assert_eq!(recurring.len(), 1);
        let ghost = &recurring[0];
        assert_eq!(ghost.url, "https://ghost.example/a");
        assert_eq!(ghost.times_seen, 2);
        assert!((ghost.avg_gap_days - 6.0).abs() < 0.1);
    }

    #[test]
    fn test_completed_urls_are_not_ghosts() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save(&store, &[("https://done.example/a", "Research")], 10, SessionMode::Results);
        let id = save(&store, &[("https://done.example/a", "Research")], 4, SessionMode::Results);
        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Complete, "https://done.example/a"))
            .unwrap();

        let agg = Aggregate::load(&store).unwrap();
        assert!(get_recurring_unfinished(&agg, 2, "all").is_empty());
    }

    #[test]
    fn test_time_range_filters_old_sightings() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save(&store, &[("https://ghost.example/a", "Research")], 60, SessionMode::Results);
        save(&store, &[("https://ghost.example/a", "Research")], 2, SessionMode::Results);

        let agg = Aggregate::load(&store).unwrap();
        assert_eq!(get_recurring_unfinished(&agg, 2, "all").len(), 1);
        assert!(get_recurring_unfinished(&agg, 2, "week").is_empty());
    }

    #[test]
    fn test_project_health_statuses() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();

        for (project, days_ago) in [("fresh", 1i64), ("cooling", 7), ("stale", 20), ("gone", 90)] {
            let mut s = Session::new(SessionMode::Results, 2);
            s.timestamp = s.timestamp - chrono::Duration::days(days_ago);
            s.groups.insert(
                "Research".into(),
                vec![GroupItem {
                    tab_index: 1,
                    title: "t".into(),
                    url: format!("https://{project}.example"),
                }],
            );
            s.classified_count = 1;
            s.thematic_analysis
                .project_support
                .insert(project.to_string(), serde_json::json!({"supported": true}));
            store.save(&mut s).unwrap();
        }

        let agg = Aggregate::load(&store).unwrap();
        let health = get_project_health(&agg, true);
        assert_eq!(health.len(), 4);
        // sorted ascending by days since active
        assert_eq!(health[0].project, "fresh");
        assert_eq!(health[0].status, ProjectStatus::Active);
        assert_eq!(health[1].status, ProjectStatus::Cooling);
        assert_eq!(health[2].status, ProjectStatus::Neglected);
        assert_eq!(health[3].status, ProjectStatus::Abandoned);

        let without = get_project_health(&agg, false);
        assert_eq!(without.len(), 3);
    }

    #[test]
    fn test_distraction_signature_counts_and_peaks() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save(
            &store,
            &[
                ("https://youtube.com/watch?v=1", "Entertainment"),
                ("https://twitter.com/feed", "Social Media"),
                ("https://docs.rs/serde", "Development"),
            ],
            0,
            SessionMode::Results,
        );

        let agg = Aggregate::load(&store).unwrap();
        let sig = get_distraction_signature(&agg, "all", None);
        assert_eq!(sig.total_tabs, 2);
        assert_eq!(sig.by_domain["youtube.com"], 1);
        assert_eq!(sig.by_domain["twitter.com"], 1);
        assert!(sig.by_domain.get("docs.rs").is_none());
        assert!(sig.peak_hour.is_some());
        assert!(sig.peak_day.is_some());
        assert_eq!(sig.by_mode["results"], 2);
    }

    #[test]
    fn test_distraction_mode_filter() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        save(&store, &[("https://youtube.com/a", "Entertainment")], 0, SessionMode::Results);
        save(&store, &[("https://youtube.com/b", "Entertainment")], 1, SessionMode::Launchpad);

        let agg = Aggregate::load(&store).unwrap();
        let sig = get_distraction_signature(&agg, "all", Some(SessionMode::Launchpad));
        assert_eq!(sig.total_tabs, 1);
    }

    #[test]
    fn test_empty_store_is_quiet() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let agg = Aggregate::load(&store).unwrap();
        assert!(get_recurring_unfinished(&agg, 2, "all").is_empty());
        assert!(get_project_health(&agg, true).is_empty());
        let sig = get_distraction_signature(&agg, "all", None);
        assert_eq!(sig.total_tabs, 0);
        assert!(sig.peak_hour.is_none());
    }
}

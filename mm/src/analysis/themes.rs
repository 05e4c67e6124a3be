//! Theme detector
//!
//! Clusters recurring URLs into themes by keyword overlap and session
//! co-occurrence, labels each cluster by its distinctive keywords, and folds
//! in research interests and user corrections. Theme feedback is persisted
//! user-scoped; dismissed and archived themes drop out of the active view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::fsutil::{read_json_or_default, write_json};
use crate::learning::{Correction, CorrectionSample};

use super::aggregator::Aggregate;
use super::interests::ResearchInterest;

/// Default minimum URLs that must share a keyword to seed a cluster
pub const MIN_CLUSTER_SIZE: usize = 2;

/// Keywords shared by more URLs than this are too generic to seed clusters
const MAX_KEYWORD_SPREAD: usize = 20;

/// Within-cluster pair co-occurrence ratio required for larger clusters
const MIN_COOCCURRENCE_RATIO: f64 = 0.1;

/// Title tokens with no clustering signal
const STOP_WORDS: [&str; 42] = [
    "the", "and", "for", "with", "from", "this", "that", "your", "you", "are", "was", "were", "has", "have", "had",
    "can", "will", "not", "its", "all", "one", "two", "new", "top", "best", "how", "what", "why", "when", "where",
    "guide", "using", "use", "into", "out", "about", "more", "than", "home", "page", "official", "site",
];

/// Recurrence data for one URL across the whole store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecurrence {
    pub url: String,
    pub title: String,
    pub sessions: BTreeSet<String>,
    pub days: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A detected theme
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    /// Stable content-derived id, survives relabeling
    pub id: String,
    pub label: String,
    pub urls: Vec<String>,
    pub keywords: Vec<String>,
    pub categories: BTreeSet<String>,
    pub score: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<CorrectionSample>,
}

/// User feedback actions on a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeAction {
    Confirm,
    Correct,
    Dismiss,
    Save,
    Archive,
    KeepWatching,
    Rename,
}

/// Last-recorded feedback per theme
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeFeedback {
    pub action: ThemeAction,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// File-backed store of theme feedback, keyed by theme id
pub struct ThemeFeedbackStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl ThemeFeedbackStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn load(&self) -> eyre::Result<BTreeMap<String, ThemeFeedback>> {
        read_json_or_default(&self.path)
    }

    /// Record feedback; a rename keeps the previous action's standing but
    /// stores the new label.
    pub fn record(
        &self,
        theme_id: &str,
        action: ThemeAction,
        renamed_to: Option<String>,
        note: Option<String>,
    ) -> eyre::Result<ThemeFeedback> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut feedback: BTreeMap<String, ThemeFeedback> = read_json_or_default(&self.path)?;

        let entry = ThemeFeedback {
            action,
            at: Utc::now(),
            renamed_to: match (&action, renamed_to, feedback.get(theme_id)) {
                (ThemeAction::Rename, Some(name), _) => Some(name),
                (_, _, Some(prior)) => prior.renamed_to.clone(),
                _ => None,
            },
            note,
        };
        feedback.insert(theme_id.to_string(), entry.clone());
        write_json(&self.path, &feedback)?;

        info!(%theme_id, ?action, "Recorded theme feedback");
        Ok(entry)
    }
}

/// Greedy keyword/co-occurrence clustering over the aggregate
pub struct ThemeDetector {
    pub min_cluster_size: usize,
}

impl Default for ThemeDetector {
    fn default() -> Self {
        Self {
            min_cluster_size: MIN_CLUSTER_SIZE,
        }
    }
}

impl ThemeDetector {
    /// Produce the active theme view: clusters, enriched, minus anything
    /// the user dismissed or archived.
    pub fn detect(
        &self,
        agg: &Aggregate,
        interests: &[ResearchInterest],
        corrections: &[Correction],
        feedback: &BTreeMap<String, ThemeFeedback>,
    ) -> Vec<Theme> {
        let recurrence = build_recurrence(agg);
        let cooccurrence = build_cooccurrence(agg);
        let mut themes = self.cluster(&recurrence, &cooccurrence);

        for theme in &mut themes {
            enrich(theme, interests, corrections);
            if let Some(fb) = feedback.get(&theme.id) {
                theme.status = status_for(fb.action);
                if let Some(name) = &fb.renamed_to {
                    theme.label = name.clone();
                }
            }
        }

        themes.retain(|t| t.status != "dismissed" && t.status != "archived");
        themes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(count = themes.len(), "Theme detection complete");
        themes
    }

    fn cluster(
        &self,
        recurrence: &BTreeMap<String, UrlRecurrence>,
        cooccurrence: &BTreeMap<(String, String), u32>,
    ) -> Vec<Theme> {
        // keyword -> URLs index
        let mut by_keyword: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for rec in recurrence.values() {
            for keyword in &rec.keywords {
                by_keyword.entry(keyword).or_default().insert(&rec.url);
            }
        }

        // specificity-scored keywords, most specific first
        let mut scored: Vec<(&str, f64)> = by_keyword
            .iter()
            .filter(|(_, urls)| urls.len() >= self.min_cluster_size && urls.len() <= MAX_KEYWORD_SPREAD)
            .map(|(keyword, urls)| (*keyword, 1.0 / ((urls.len() as f64 + 1.0).log2())))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(b.0)));

        let mut assigned: BTreeSet<&str> = BTreeSet::new();
        let mut themes = Vec::new();

        for (keyword, _) in scored {
            let candidates: Vec<&str> = by_keyword[keyword]
                .iter()
                .filter(|url| !assigned.contains(*url))
                .copied()
                .collect();
            if candidates.len() < self.min_cluster_size {
                continue;
            }

            let ratio = cooccurrence_ratio(&candidates, cooccurrence);
            if ratio < MIN_COOCCURRENCE_RATIO && candidates.len() > 3 {
                continue;
            }

            // expand with unassigned URLs tied to the cluster
            let mut cluster: BTreeSet<&str> = candidates.into_iter().collect();
            let cluster_keywords: BTreeSet<&str> = cluster
                .iter()
                .flat_map(|url| recurrence[*url].keywords.iter().map(String::as_str))
                .collect();
            for rec in recurrence.values() {
                if assigned.contains(rec.url.as_str()) || cluster.contains(rec.url.as_str()) {
                    continue;
                }
                let tied = cluster
                    .iter()
                    .any(|member| pair_count(cooccurrence, member, &rec.url) >= 2);
                let shares = rec.keywords.iter().any(|k| cluster_keywords.contains(k.as_str()));
                if tied && shares {
                    cluster.insert(&rec.url);
                }
            }

            for url in &cluster {
                assigned.insert(*url);
            }

            themes.push(build_theme(&cluster, recurrence, cooccurrence));
        }

        themes
    }
}

fn build_recurrence(agg: &Aggregate) -> BTreeMap<String, UrlRecurrence> {
    let mut recurrence: BTreeMap<String, UrlRecurrence> = BTreeMap::new();
    for occurrence in &agg.occurrences {
        if occurrence.url.is_empty() {
            continue;
        }
        let rec = recurrence
            .entry(occurrence.url.clone())
            .or_insert_with(|| UrlRecurrence {
                url: occurrence.url.clone(),
                title: occurrence.title.clone(),
                sessions: BTreeSet::new(),
                days: BTreeSet::new(),
                categories: BTreeSet::new(),
                keywords: title_keywords(&occurrence.title),
                first_seen: occurrence.session_timestamp,
                last_seen: occurrence.session_timestamp,
            });
        rec.sessions.insert(occurrence.session_id.clone());
        rec.days.insert(occurrence.session_timestamp.date_naive().to_string());
        rec.categories.insert(occurrence.category.clone());
        rec.first_seen = rec.first_seen.min(occurrence.session_timestamp);
        rec.last_seen = rec.last_seen.max(occurrence.session_timestamp);
    }
    recurrence
}

fn build_cooccurrence(agg: &Aggregate) -> BTreeMap<(String, String), u32> {
    let mut per_session: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for occurrence in &agg.occurrences {
        if !occurrence.url.is_empty() {
            per_session
                .entry(occurrence.session_id.as_str())
                .or_default()
                .insert(occurrence.url.as_str());
        }
    }

    let mut counts: BTreeMap<(String, String), u32> = BTreeMap::new();
    for urls in per_session.values() {
        let urls: Vec<&&str> = urls.iter().collect();
        for i in 0..urls.len() {
            for j in (i + 1)..urls.len() {
                *counts.entry(pair_key(urls[i], urls[j])).or_default() += 1;
            }
        }
    }
    counts
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn pair_count(cooccurrence: &BTreeMap<(String, String), u32>, a: &str, b: &str) -> u32 {
    cooccurrence.get(&pair_key(a, b)).copied().unwrap_or(0)
}

/// Fraction of unordered in-group pairs that co-occur at all
fn cooccurrence_ratio(urls: &[&str], cooccurrence: &BTreeMap<(String, String), u32>) -> f64 {
    let n = urls.len();
    if n < 2 {
        return 1.0;
    }
    let mut hit = 0u32;
    let mut total = 0u32;
    for i in 0..n {
        for j in (i + 1)..n {
            total += 1;
            if pair_count(cooccurrence, urls[i], urls[j]) > 0 {
                hit += 1;
            }
        }
    }
    hit as f64 / total as f64
}

fn build_theme(
    cluster: &BTreeSet<&str>,
    recurrence: &BTreeMap<String, UrlRecurrence>,
    cooccurrence: &BTreeMap<(String, String), u32>,
) -> Theme {
    let members: Vec<&UrlRecurrence> = cluster.iter().map(|url| &recurrence[*url]).collect();

    // label keywords: frequent within the cluster
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for member in &members {
        for keyword in &member.keywords {
            *frequency.entry(keyword).or_default() += 1;
        }
    }
    let threshold = 2.max((0.3 * cluster.len() as f64).ceil() as usize);
    let mut frequent: Vec<(&str, usize)> = frequency.into_iter().filter(|(_, count)| *count >= threshold).collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let label_keywords: Vec<String> = frequent.iter().take(3).map(|(k, _)| k.to_string()).collect();
    let label = if label_keywords.is_empty() {
        let mut domains: BTreeMap<String, usize> = BTreeMap::new();
        for member in &members {
            if let Some(domain) = crate::classify::hostname(&member.url) {
                *domains.entry(domain).or_default() += 1;
            }
        }
        let top_domain = domains
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(domain, _)| domain)
            .unwrap_or_else(|| "misc".to_string());
        format!("{top_domain} cluster")
    } else {
        label_keywords
            .iter()
            .map(|k| capitalize(k))
            .collect::<Vec<_>>()
            .join(" + ")
    };

    // score: membership, recurrence, spread, breadth, cohesion
    let urls: Vec<String> = cluster.iter().map(|u| u.to_string()).collect();
    let total_recurrence: usize = members.iter().map(|m| m.sessions.len()).sum();
    let distinct_days: BTreeSet<&str> = members.iter().flat_map(|m| m.days.iter().map(String::as_str)).collect();
    let categories: BTreeSet<String> = members.iter().flat_map(|m| m.categories.iter().cloned()).collect();
    let co_score: u32 = {
        let list: Vec<&str> = cluster.iter().copied().collect();
        let mut sum = 0;
        for i in 0..list.len() {
            for j in (i + 1)..list.len() {
                sum += pair_count(cooccurrence, list[i], list[j]);
            }
        }
        sum
    };
    let score = 15.0 * urls.len() as f64
        + 5.0 * total_recurrence as f64
        + 8.0 * distinct_days.len() as f64
        + 10.0 * categories.len() as f64
        + 3.0 * co_score as f64;

    Theme {
        id: theme_id(&urls),
        label,
        urls,
        keywords: label_keywords,
        categories,
        score,
        status: "active".to_string(),
        related_interests: Vec::new(),
        corrections: Vec::new(),
    }
}

fn enrich(theme: &mut Theme, interests: &[ResearchInterest], corrections: &[Correction]) {
    for interest in interests {
        let related = interest.keywords.iter().any(|ik| {
            theme
                .keywords
                .iter()
                .any(|tk| tk.contains(ik.as_str()) || ik.contains(tk.as_str()))
        });
        if related {
            theme.related_interests.push(interest.name.clone());
        }
    }

    for correction in corrections {
        if theme.urls.iter().any(|u| *u == correction.url) {
            theme.corrections.push(CorrectionSample {
                session_id: correction.session_id.clone(),
                url: correction.url.clone(),
                from: correction.from.clone(),
                to: correction.to.clone(),
            });
        }
    }
}

fn status_for(action: ThemeAction) -> String {
    match action {
        ThemeAction::Confirm => "confirmed",
        ThemeAction::Correct => "corrected",
        ThemeAction::Dismiss => "dismissed",
        ThemeAction::Save => "saved",
        ThemeAction::Archive => "archived",
        ThemeAction::KeepWatching => "watching",
        ThemeAction::Rename => "active",
    }
    .to_string()
}

/// Stable id from the sorted member URLs
fn theme_id(urls: &[String]) -> String {
    use std::hash::{Hash, Hasher};
    let mut sorted = urls.to_vec();
    sorted.sort();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sorted.hash(&mut hasher);
    format!("theme-{:016x}", hasher.finish())
}

/// Title tokens minus stop words and short/numeric noise
fn title_keywords(title: &str) -> BTreeSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3 && !STOP_WORDS.contains(&t.as_str()) && !t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

//! Longitudinal aggregator
//!
//! Flattens every stored session into per-tab occurrence records and indexes
//! them by URL, domain, category, and project. Queries and the theme
//! detector work off this aggregate instead of rescanning the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use sessionstore::{ItemStatus, SessionMode, SessionStore, fold_item_states};

use crate::classify::hostname;

/// One tab sighting in one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabOccurrence {
    pub url: String,
    pub title: String,
    pub category: String,
    pub session_id: String,
    pub session_timestamp: DateTime<Utc>,
    pub session_mode: SessionMode,
    /// Final folded status; `None` while still pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<ItemStatus>,
}

/// One session's support for a project, from thematic analysis
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSighting {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub tab_count: u32,
}

/// The flattened view of the whole store
#[derive(Debug, Default)]
pub struct Aggregate {
    pub occurrences: Vec<TabOccurrence>,
    /// Indexes hold positions into `occurrences`
    pub by_url: BTreeMap<String, Vec<usize>>,
    pub by_domain: BTreeMap<String, Vec<usize>>,
    pub by_category: BTreeMap<String, Vec<usize>>,
    pub by_project: BTreeMap<String, Vec<ProjectSighting>>,
    pub session_count: usize,
}

impl Aggregate {
    /// Load and flatten every parseable session; malformed files are already
    /// skipped by the store with a warning.
    pub fn load(store: &SessionStore) -> eyre::Result<Self> {
        let mut agg = Aggregate::default();

        for (session_id, session) in store.load_all()? {
            agg.session_count += 1;
            let states = fold_item_states(&session);

            for state in states.values() {
                let index = agg.occurrences.len();
                let url = state.url.clone();

                agg.occurrences.push(TabOccurrence {
                    url: url.clone(),
                    title: state.title.clone(),
                    category: state.current_category.clone(),
                    session_id: session_id.clone(),
                    session_timestamp: session.timestamp,
                    session_mode: session.mode,
                    disposition: (state.status != ItemStatus::Pending).then_some(state.status),
                });

                if !url.is_empty() {
                    agg.by_url.entry(url.clone()).or_default().push(index);
                    if let Some(domain) = hostname(&url) {
                        agg.by_domain.entry(domain).or_default().push(index);
                    }
                }
                agg.by_category
                    .entry(state.current_category.clone())
                    .or_default()
                    .push(index);
            }

            for project in session.thematic_analysis.project_support.keys() {
                agg.by_project.entry(project.clone()).or_default().push(ProjectSighting {
                    session_id: session_id.clone(),
                    timestamp: session.timestamp,
                    tab_count: session.total_tabs,
                });
            }
        }

        debug!(
            sessions = agg.session_count,
            occurrences = agg.occurrences.len(),
            projects = agg.by_project.len(),
            "Aggregated sessions"
        );
        Ok(agg)
    }

    /// Occurrences for a URL, oldest session first
    pub fn occurrences_for_url(&self, url: &str) -> Vec<&TabOccurrence> {
        let mut occ: Vec<&TabOccurrence> = self
            .by_url
            .get(url)
            .map(|idxs| idxs.iter().map(|i| &self.occurrences[*i]).collect())
            .unwrap_or_default();
        occ.sort_by_key(|o| o.session_timestamp);
        occ
    }
}

//! Task generator
//!
//! Turns longitudinal signals into ranked candidate tasks: ghost tabs worth
//! confronting, projects worth reviving, and the occasional invitation to
//! declare tab bankruptcy.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{Aggregate, ProjectStatus, get_project_health, get_recurring_unfinished};

use super::state::{Blocklist, DeferralStore, PausedProjects};

/// Stale ghost tabs needed before a bankruptcy task appears
pub const BANKRUPTCY_THRESHOLD: usize = 10;

/// Days without a sighting before a recurring tab counts as stale
pub const STALE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GhostTab,
    ProjectRevival,
    TabBankruptcy,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GhostTab => "ghost_tab",
            Self::ProjectRevival => "project_revival",
            Self::TabBankruptcy => "tab_bankruptcy",
        };
        write!(f, "{name}")
    }
}

/// A ranked attention prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTask {
    pub id: String,
    pub task_type: TaskType,
    pub title: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// Generates candidate tasks, honoring blocklist, deferrals, and pauses
pub struct TaskGenerator<'a> {
    blocklist: &'a Blocklist,
    deferrals: &'a DeferralStore,
    paused: &'a PausedProjects,
}

impl<'a> TaskGenerator<'a> {
    pub fn new(blocklist: &'a Blocklist, deferrals: &'a DeferralStore, paused: &'a PausedProjects) -> Self {
        Self {
            blocklist,
            deferrals,
            paused,
        }
    }

    /// All candidate tasks, highest score first
    pub fn generate(&self, agg: &Aggregate) -> eyre::Result<Vec<CandidateTask>> {
        let mut tasks = self.generate_ghost_tab_tasks(agg)?;
        tasks.extend(self.generate_project_revival_tasks(agg)?);
        tasks.extend(self.generate_bankruptcy_task(agg)?);
        tasks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(count = tasks.len(), "Generated candidate tasks");
        Ok(tasks)
    }

    /// score = 10 * openCount + 2 * daysSinceFirstSeen
    pub fn generate_ghost_tab_tasks(&self, agg: &Aggregate) -> eyre::Result<Vec<CandidateTask>> {
        let blocked = self.blocklist.load()?;
        let deferred = self.deferrals.load_active()?;
        let now = Utc::now();

        Ok(get_recurring_unfinished(agg, 2, "all")
            .into_iter()
            .filter(|ghost| !blocked.contains(&ghost.url) && !deferred.contains_key(&ghost.url))
            .map(|ghost| {
                let days_since_first_seen = (now - ghost.first_seen).num_days();
                CandidateTask {
                    id: format!("ghost-{:016x}", stable_hash(&ghost.url)),
                    task_type: TaskType::GhostTab,
                    title: format!("Still open after {} sessions: {}", ghost.times_seen, ghost.title),
                    score: 10.0 * ghost.times_seen as f64 + 2.0 * days_since_first_seen as f64,
                    url: Some(ghost.url),
                    project: None,
                    urls: Vec::new(),
                }
            })
            .collect())
    }

    /// score = 5 * daysSinceActive + 2 * totalTabs, for neglected or
    /// abandoned projects not currently paused
    pub fn generate_project_revival_tasks(&self, agg: &Aggregate) -> eyre::Result<Vec<CandidateTask>> {
        let paused = self.paused.load_active()?;

        Ok(get_project_health(agg, true)
            .into_iter()
            .filter(|h| matches!(h.status, ProjectStatus::Neglected | ProjectStatus::Abandoned))
            .filter(|h| !paused.contains(&h.project))
            .map(|h| CandidateTask {
                id: format!("revival-{}", h.project),
                task_type: TaskType::ProjectRevival,
                title: format!("{} has been quiet for {} days", h.project, h.days_since_active),
                score: 5.0 * h.days_since_active as f64 + 2.0 * h.total_tabs as f64,
                url: None,
                project: Some(h.project),
                urls: Vec::new(),
            })
            .collect())
    }

    /// score = 3 * affectedCount + 2 * avgDaysStale, once enough stale
    /// ghosts pile up
    pub fn generate_bankruptcy_task(&self, agg: &Aggregate) -> eyre::Result<Vec<CandidateTask>> {
        let blocked = self.blocklist.load()?;
        let deferred = self.deferrals.load_active()?;
        let now = Utc::now();

        let stale: Vec<_> = get_recurring_unfinished(agg, 2, "all")
            .into_iter()
            .filter(|ghost| !blocked.contains(&ghost.url) && !deferred.contains_key(&ghost.url))
            .filter(|ghost| (now - ghost.last_seen).num_days() > STALE_DAYS)
            .collect();

        if stale.len() < BANKRUPTCY_THRESHOLD {
            return Ok(Vec::new());
        }

        let avg_days_stale =
            stale.iter().map(|g| (now - g.last_seen).num_days() as f64).sum::<f64>() / stale.len() as f64;
        let urls: Vec<String> = stale.into_iter().map(|g| g.url).collect();

        Ok(vec![CandidateTask {
            id: format!("bankruptcy-{:016x}", stable_hash(&urls.join("\n"))),
            task_type: TaskType::TabBankruptcy,
            title: format!("{} tabs have gone stale; consider letting them go", urls.len()),
            score: 3.0 * urls.len() as f64 + 2.0 * avg_days_stale,
            url: None,
            project: None,
            urls,
        }])
    }
}

fn stable_hash(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

//! Task actions
//!
//! The write path of the task layer. Each action takes effect through
//! durable state: dispositions on stored sessions, the blocklist, deferrals,
//! and paused projects. Every action is recorded in the append-only task
//! log.

use chrono::Utc;
use eyre::{Result, bail};
use tracing::{info, warn};

use sessionstore::{DispositionAction, NewDisposition, Session, SessionId, SessionStore};

use super::generator::CandidateTask;
use super::state::{Blocklist, DeferralStore, PausedProjects, TaskLog, TaskLogEntry};

/// Default ghost-tab deferral
pub const DEFAULT_DEFER_HOURS: i64 = 24;

/// Default project pause
pub const DEFAULT_PAUSE_DAYS: i64 = 30;

/// Skipping any task hides it briefly
pub const SKIP_DEFER_HOURS: i64 = 1;

/// Real action handlers over the durable stores
pub struct TaskActions<'a> {
    store: &'a SessionStore,
    blocklist: &'a Blocklist,
    deferrals: &'a DeferralStore,
    paused: &'a PausedProjects,
    log: &'a TaskLog,
}

impl<'a> TaskActions<'a> {
    pub fn new(
        store: &'a SessionStore,
        blocklist: &'a Blocklist,
        deferrals: &'a DeferralStore,
        paused: &'a PausedProjects,
        log: &'a TaskLog,
    ) -> Self {
        Self {
            store,
            blocklist,
            deferrals,
            paused,
            log,
        }
    }

    fn sessions_containing(&self, url: &str) -> Result<Vec<(SessionId, Session)>> {
        Ok(self
            .store
            .load_all()?
            .into_iter()
            .filter(|(_, session)| session.items().any(|(_, item)| item.url == url))
            .collect())
    }

    fn log_action(&self, task: &CandidateTask, action: &str, outcome: String) -> Result<()> {
        self.log.append(&TaskLogEntry {
            task_id: task.id.clone(),
            task_type: task.task_type.to_string(),
            action: action.to_string(),
            at: Utc::now(),
            task: serde_json::to_value(task)?,
            outcome,
        })
    }

    /// Engage a ghost tab: complete it in its most recent session, then
    /// defer the URL for a day so it does not immediately resurface.
    pub async fn engage_ghost_tab(&self, task: &CandidateTask) -> Result<String> {
        let Some(url) = task.url.as_deref() else {
            bail!("ghost_tab task has no url");
        };

        let sessions = self.sessions_containing(url)?;
        let Some((session_id, _)) = sessions.last() else {
            bail!("No session contains {url}");
        };

        self.store
            .append_disposition(session_id, NewDisposition::new(DispositionAction::Complete, url))?;
        self.deferrals.defer(url, DEFAULT_DEFER_HOURS)?;

        let outcome = format!("completed in {session_id}, deferred {DEFAULT_DEFER_HOURS}h");
        self.log_action(task, "engage", outcome.clone())?;
        info!(%url, %session_id, "Engaged ghost tab");
        Ok(outcome)
    }

    /// Release a ghost tab: trash it in every session that contains it and
    /// blocklist the URL so it never surfaces as a task again.
    pub async fn release_ghost_tab(&self, task: &CandidateTask) -> Result<String> {
        let Some(url) = task.url.as_deref() else {
            bail!("ghost_tab task has no url");
        };

        let sessions = self.sessions_containing(url)?;
        let mut trashed = 0;
        for (session_id, _) in &sessions {
            match self
                .store
                .append_disposition(session_id, NewDisposition::new(DispositionAction::Trash, url))
            {
                Ok(_) => trashed += 1,
                Err(e) => warn!(%session_id, error = %e, "Could not trash ghost in session"),
            }
        }
        self.blocklist.add(url)?;

        let outcome = format!("trashed in {trashed} sessions, blocklisted");
        self.log_action(task, "release", outcome.clone())?;
        info!(%url, trashed, "Released ghost tab");
        Ok(outcome)
    }

    /// Defer a ghost tab for `hours` (default 24)
    pub async fn defer_ghost_tab(&self, task: &CandidateTask, hours: Option<i64>) -> Result<String> {
        let Some(url) = task.url.as_deref() else {
            bail!("ghost_tab task has no url");
        };
        let hours = hours.unwrap_or(DEFAULT_DEFER_HOURS);
        let until = self.deferrals.defer(url, hours)?;

        let outcome = format!("deferred until {until}");
        self.log_action(task, "defer", outcome.clone())?;
        Ok(outcome)
    }

    /// Engage a project: point the user at its most recent session
    pub async fn engage_project(&self, task: &CandidateTask) -> Result<String> {
        let Some(project) = task.project.as_deref() else {
            bail!("project task has no project");
        };

        let recent = self
            .store
            .load_all()?
            .into_iter()
            .rev()
            .find(|(_, session)| session.thematic_analysis.project_support.contains_key(project));
        let Some((session_id, _)) = recent else {
            bail!("No session mentions project {project}");
        };

        let outcome = format!("most recent session: {session_id}");
        self.log_action(task, "engage", outcome.clone())?;
        info!(%project, %session_id, "Engaged project");
        Ok(outcome)
    }

    /// Pause a project for `days` (default 30)
    pub async fn pause_project(&self, task: &CandidateTask, days: Option<i64>) -> Result<String> {
        let Some(project) = task.project.as_deref() else {
            bail!("project task has no project");
        };
        let days = days.unwrap_or(DEFAULT_PAUSE_DAYS);
        let until = self.paused.pause(project, days)?;

        let outcome = format!("paused until {until}");
        self.log_action(task, "pause", outcome.clone())?;
        Ok(outcome)
    }

    /// Declare bankruptcy: blocklist every stale URL in the task
    pub async fn declare_bankruptcy(&self, task: &CandidateTask) -> Result<String> {
        if task.urls.is_empty() {
            bail!("bankruptcy task has no urls");
        }
        for url in &task.urls {
            self.blocklist.add(url)?;
        }

        let outcome = format!("blocklisted {} urls", task.urls.len());
        self.log_action(task, "bankruptcy", outcome.clone())?;
        info!(count = task.urls.len(), "Declared tab bankruptcy");
        Ok(outcome)
    }

    /// Skip any task: short-term avoidance, deferred one hour by task id
    pub async fn skip(&self, task: &CandidateTask) -> Result<String> {
        let until = self.deferrals.defer(&task.id, SKIP_DEFER_HOURS)?;
        let outcome = format!("skipped until {until}");
        self.log_action(task, "skip", outcome.clone())?;
        Ok(outcome)
    }
}

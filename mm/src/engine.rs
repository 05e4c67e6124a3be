//! Memento engine facade
//!
//! Owns the stores and the runner registry and exposes the operations the
//! HTTP surface calls: capture classification, lock management,
//! dispositions, efforts, preferences, longitudinal queries, themes, and
//! task actions. The HTTP layer itself lives outside the core.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use sessionstore::{
    AppliedSessionView, Disposition, DispositionError, Effort, EffortError, EffortStats, NewDisposition, SearchHit,
    Session, SessionId, SessionMode, SessionStore, SessionSummary, SessionView, StoreError, ThematicAnalysis,
    validate_session_id,
};

use crate::analysis::{
    Aggregate, DistractionSignature, ProjectHealth, RecurringTab, Theme, ThemeAction, ThemeDetector, ThemeFeedback,
    ThemeFeedbackStore, get_distraction_signature, get_project_health, get_recurring_unfinished, load_interests,
};
use crate::classify::{Classifier, ClassifyContext, Project, Tab};
use crate::config::Config;
use crate::learning::{
    CorrectionAnalyzer, DomainRate, DomainRule, DomainRuleSignal, DomainRuleStore, ExtractorSuggestion,
    LearnedRulesFile, PreferenceRule, PreferenceStore,
};
use crate::llm::{LlmError, ModelRunner, create_runner};
use crate::lock::{LockError, LockManager, LockRecord, LockStatus};
use crate::prompts::PromptLoader;
use crate::tasks::{Blocklist, CandidateTask, DeferralStore, PausedProjects, TaskActions, TaskGenerator, TaskLog, TaskType};

/// User context file considered stale after this long
const USER_CONTEXT_TTL_HOURS: i64 = 24;

/// The error kinds the core recognizes at its boundary
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already locked by session {holder}")]
    AlreadyLocked { holder: String },

    #[error("Lock is held by session {holder}, not the caller")]
    SessionIdMismatch { holder: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Upstream model error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidSessionId(id) => EngineError::InvalidArgument(format!("invalid session id {id:?}")),
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Io(other.to_string()),
        }
    }
}

impl From<DispositionError> for EngineError {
    fn from(e: DispositionError) -> Self {
        match e {
            DispositionError::SessionNotFound(id) => EngineError::NotFound(id),
            DispositionError::Store(inner) => inner.into(),
            other => EngineError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<EffortError> for EngineError {
    fn from(e: EffortError) -> Self {
        match e {
            EffortError::SessionNotFound(id) => EngineError::NotFound(id),
            EffortError::NotFound(id) => EngineError::NotFound(id),
            EffortError::NotPending { .. } => EngineError::PreconditionFailed(e.to_string()),
            EffortError::Disposition(inner) => inner.into(),
            EffortError::Store(inner) => inner.into(),
            other => EngineError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::AlreadyLocked { holder } => EngineError::AlreadyLocked { holder },
            LockError::SessionIdMismatch { holder } => EngineError::SessionIdMismatch { holder },
            LockError::NotLocked => EngineError::PreconditionFailed("no lock is held".to_string()),
            other => EngineError::Io(other.to_string()),
        }
    }
}

impl From<LlmError> for EngineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::UnknownEngine(id) => EngineError::InvalidArgument(format!("unknown engine {id:?}")),
            other => EngineError::Upstream(other.to_string()),
        }
    }
}

impl From<eyre::Report> for EngineError {
    fn from(e: eyre::Report) -> Self {
        EngineError::Io(e.to_string())
    }
}

/// Capture request, mirroring the extension payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub context: Option<ClassifyContext>,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub mode: SessionMode,
}

/// On-disk shape of the optional user context file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UserContextFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    generated: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    active_projects: Vec<Project>,
}

/// Artifact written by a pass-4-only reclassification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reclassification {
    pub original_session_id: SessionId,
    pub timestamp: chrono::DateTime<Utc>,
    pub thematic_analysis: ThematicAnalysis,
    pub engine: String,
    pub model: String,
}

/// The core engine: stores plus runner registry
pub struct Memento {
    config: Config,
    store: SessionStore,
    lock: LockManager,
    preferences: PreferenceStore,
    domain_rules: DomainRuleStore,
    theme_feedback: ThemeFeedbackStore,
    blocklist: Blocklist,
    deferrals: DeferralStore,
    paused: PausedProjects,
    task_log: TaskLog,
    runners: HashMap<String, Arc<dyn ModelRunner>>,
}

impl Memento {
    /// Open every store under the configured directories
    pub fn open(config: Config) -> eyre::Result<Self> {
        let store = SessionStore::open(config.sessions_dir())?;
        let lock = LockManager::open(config.lock_path());
        let preferences = PreferenceStore::open(config.learned_rules_path());
        let domain_rules = DomainRuleStore::open(config.domain_rules_path());
        let theme_feedback = ThemeFeedbackStore::open(config.data_dir.join("theme-feedback.json"));
        let blocklist = Blocklist::open(config.data_dir.join("released-urls.json"));
        let deferrals = DeferralStore::open(config.data_dir.join("deferred-tasks.json"));
        let paused = PausedProjects::open(config.data_dir.join("paused-projects.json"));
        let task_log = TaskLog::open(config.data_dir.join("task-log.jsonl"));

        info!(data_dir = %config.data_dir.display(), "Memento engine opened");
        Ok(Self {
            config,
            store,
            lock,
            preferences,
            domain_rules,
            theme_feedback,
            blocklist,
            deferrals,
            paused,
            task_log,
            runners: HashMap::new(),
        })
    }

    /// Register a runner under an engine id (tests, custom engines)
    pub fn with_runner(mut self, engine_id: &str, runner: Arc<dyn ModelRunner>) -> Self {
        self.runners.insert(engine_id.to_string(), runner);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn runner_for(&self, engine_id: &str) -> Result<Arc<dyn ModelRunner>, LlmError> {
        if let Some(runner) = self.runners.get(engine_id) {
            return Ok(runner.clone());
        }
        create_runner(&self.config, engine_id)
    }

    /// Active projects from the user context file, if present and fresh
    fn user_context(&self) -> Option<ClassifyContext> {
        let path = self.config.user_context_path();
        let content = std::fs::read_to_string(&path).ok()?;
        let file: UserContextFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable user context file");
                return None;
            }
        };
        if let Some(generated) = file.generated
            && Utc::now() - generated > Duration::hours(USER_CONTEXT_TTL_HOURS)
        {
            debug!(version = file.version, "User context is stale, ignoring");
            return None;
        }
        Some(ClassifyContext {
            active_projects: file.active_projects,
        })
    }

    // ---- capture ----

    /// Classify a capture, persist the artifact, and (in Launchpad mode)
    /// take the capture lock.
    pub async fn classify_browser_context(&self, request: ClassifyRequest) -> Result<Session, EngineError> {
        if request.mode == SessionMode::Launchpad {
            let status = self.lock.get_lock_status();
            if status.locked {
                return Err(EngineError::AlreadyLocked {
                    holder: status.session_id.unwrap_or_default(),
                });
            }
        }

        let engine_id = request.engine.as_deref().unwrap_or(&self.config.default_engine);
        let runner = self.runner_for(engine_id)?;
        let prompts = PromptLoader::new(Some(&self.config.prompts_dir))?;
        let classifier = Classifier::new(
            runner,
            prompts,
            self.config.pricing,
            request.debug_mode || self.config.debug,
        );

        let context = request
            .context
            .clone()
            .or_else(|| self.user_context())
            .unwrap_or_default();
        let preferences = self.preferences.get_approved_rules().unwrap_or_else(|e| {
            warn!(error = %e, "Could not load preferences, classifying without");
            Vec::new()
        });
        let domain_rules = self.domain_rules.load().unwrap_or_else(|e| {
            warn!(error = %e, "Could not load domain rules");
            Default::default()
        });

        let outcome = classifier
            .classify(&request.tabs, request.mode, &context, &preferences, &domain_rules)
            .await;
        let mut session = outcome.session;

        let saved = self.store.save(&mut session);

        if !outcome.applied_preferences.is_empty() {
            let ids: Vec<String> = outcome.applied_preferences.iter().map(|p| p.rule_id.clone()).collect();
            if let Err(e) = self.preferences.increment_applications(&ids) {
                warn!(error = %e, "Could not bump preference application counters");
            }
        }

        if request.mode == SessionMode::Launchpad
            && let Some(session_id) = saved
        {
            let items = session.groups.values().map(|v| v.len() as u32).sum();
            self.lock.acquire_lock(&session_id, items)?;
        }

        Ok(session)
    }

    /// Pass-4-only reclassification against a stored session; writes a
    /// separate artifact under `reclassifications/`.
    pub async fn reclassify(&self, session_id: &str, engine: Option<&str>) -> Result<Reclassification, EngineError> {
        let session = self
            .store
            .read(session_id)?
            .ok_or_else(|| EngineError::NotFound(session_id.to_string()))?;

        let engine_id = engine.unwrap_or(&self.config.default_engine);
        let runner = self.runner_for(engine_id)?;
        let info = runner.info();
        let prompts = PromptLoader::new(Some(&self.config.prompts_dir))?;
        let classifier = Classifier::new(runner, prompts, self.config.pricing, self.config.debug);

        let projects = self.user_context().map(|c| c.active_projects).unwrap_or_default();
        let thematic = classifier.run_thematic_pass(&session, &projects).await;

        let artifact = Reclassification {
            original_session_id: session_id.to_string(),
            timestamp: Utc::now(),
            thematic_analysis: thematic,
            engine: info.engine,
            model: info.model,
        };

        let filename = format!("{session_id}--{}.json", Session::id_for(&artifact.timestamp));
        let path = self.config.reclassifications_dir().join(filename);
        crate::fsutil::write_json(&path, &artifact)?;
        info!(%session_id, path = %path.display(), "Wrote reclassification artifact");

        Ok(artifact)
    }

    // ---- lock ----

    pub fn get_lock_status(&self) -> LockStatus {
        self.lock.get_lock_status()
    }

    pub fn acquire_lock(&self, session_id: &str, items_remaining: u32) -> Result<LockRecord, EngineError> {
        validate_session_id(session_id)?;
        Ok(self.lock.acquire_lock(session_id, items_remaining)?)
    }

    /// Clear the lock after the session is fully resolved. Without
    /// `override_holder`, unresolved items are a precondition failure.
    pub fn clear_session_lock(&self, session_id: &str, override_holder: bool) -> Result<(), EngineError> {
        if !override_holder {
            let view = self.store.get_session_with_dispositions(session_id)?;
            if view.unresolved_count > 0 {
                return Err(EngineError::PreconditionFailed(format!(
                    "{} items still unresolved",
                    view.unresolved_count
                )));
            }
        }
        Ok(self.lock.clear_lock(session_id, override_holder)?)
    }

    pub fn update_lock_items_remaining(&self, items: u32) -> Result<LockRecord, EngineError> {
        Ok(self.lock.update_items_remaining(items)?)
    }

    pub fn update_lock_resume_state(&self, partial: Value) -> Result<LockRecord, EngineError> {
        Ok(self.lock.update_resume_state(partial)?)
    }

    /// Keep the lock's counter in step with the view after a log write
    fn sync_lock_counter(&self, session_id: &str) {
        let status = self.lock.get_lock_status();
        if status.locked && status.session_id.as_deref() == Some(session_id) {
            match self.store.get_session_with_dispositions(session_id) {
                Ok(view) => {
                    if let Err(e) = self.lock.update_items_remaining(view.unresolved_count) {
                        warn!(error = %e, "Could not update lock counter");
                    }
                }
                Err(e) => warn!(error = %e, "Could not recompute unresolved count"),
            }
        }
    }

    // ---- sessions and dispositions ----

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        Ok(self.store.list()?)
    }

    pub fn read_session(&self, session_id: &str) -> Result<Option<Session>, EngineError> {
        Ok(self.store.read(session_id)?)
    }

    pub fn get_latest_session(&self) -> Result<Option<Session>, EngineError> {
        Ok(self.store.get_latest()?)
    }

    pub fn search_sessions(&self, query: &str) -> Result<Vec<SearchHit>, EngineError> {
        Ok(self.store.search(query)?)
    }

    pub fn append_disposition(&self, session_id: &str, d: NewDisposition) -> Result<Disposition, EngineError> {
        let appended = self.store.append_disposition(session_id, d)?;
        self.sync_lock_counter(session_id);
        Ok(appended)
    }

    pub fn append_batch_disposition(
        &self,
        session_id: &str,
        batch: Vec<NewDisposition>,
    ) -> Result<Vec<Disposition>, EngineError> {
        let appended = self.store.append_batch_disposition(session_id, batch)?;
        self.sync_lock_counter(session_id);
        Ok(appended)
    }

    pub fn get_dispositions(&self, session_id: &str) -> Result<Vec<Disposition>, EngineError> {
        Ok(self.store.get_dispositions(session_id)?)
    }

    pub fn get_session_view(&self, session_id: &str) -> Result<SessionView, EngineError> {
        Ok(self.store.get_session_with_dispositions(session_id)?)
    }

    pub fn get_session_view_applied(&self, session_id: &str) -> Result<AppliedSessionView, EngineError> {
        Ok(self.store.get_session_with_dispositions_applied(session_id)?)
    }

    // ---- efforts ----

    pub fn create_effort(&self, session_id: &str, name: &str, items: Vec<String>) -> Result<Effort, EngineError> {
        Ok(self.store.create_effort(session_id, name, items)?)
    }

    pub fn complete_effort(&self, session_id: &str, effort_id: &str) -> Result<Effort, EngineError> {
        let effort = self.store.complete_effort(session_id, effort_id)?;
        self.sync_lock_counter(session_id);
        Ok(effort)
    }

    pub fn defer_effort(&self, session_id: &str, effort_id: &str) -> Result<Effort, EngineError> {
        let effort = self.store.defer_effort(session_id, effort_id)?;
        self.sync_lock_counter(session_id);
        Ok(effort)
    }

    pub fn effort_stats(&self, session_id: &str) -> Result<EffortStats, EngineError> {
        Ok(self.store.effort_stats(session_id)?)
    }

    // ---- preferences ----

    /// Stored rules plus fresh suggestions from the correction analyzer
    pub fn list_preferences(&self) -> Result<(LearnedRulesFile, Vec<PreferenceRule>), EngineError> {
        let file = self.preferences.load()?;
        let analyzer = CorrectionAnalyzer::new(&self.store);
        let suggestions = analyzer.generate_rule_suggestions(&self.preferences, 2)?;
        Ok((file, suggestions))
    }

    /// Approve a rule by id, stored or freshly suggested
    pub fn approve_preference(&self, id: &str) -> Result<PreferenceRule, EngineError> {
        let file = self.preferences.load()?;
        if let Some(rule) = file.rules.into_iter().find(|r| r.id == id) {
            return Ok(self.preferences.approve_rule(rule)?);
        }

        let analyzer = CorrectionAnalyzer::new(&self.store);
        let suggestions = analyzer.generate_rule_suggestions(&self.preferences, 2)?;
        match suggestions.into_iter().find(|s| s.id == id) {
            Some(rule) => Ok(self.preferences.approve_rule(rule)?),
            None => Err(EngineError::NotFound(format!("preference rule {id}"))),
        }
    }

    pub fn reject_preference(&self, id: &str) -> Result<(), EngineError> {
        Ok(self.preferences.reject_rule(id)?)
    }

    pub fn unapprove_preference(&self, id: &str) -> Result<(), EngineError> {
        if self.preferences.unapprove_rule(id)? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("preference rule {id}")))
        }
    }

    // ---- domain rules ----

    pub fn list_domain_rules(&self) -> Result<std::collections::BTreeMap<String, DomainRule>, EngineError> {
        Ok(self.domain_rules.load()?)
    }

    pub fn set_domain_rule(
        &self,
        host: &str,
        signal: DomainRuleSignal,
        reason: &str,
    ) -> Result<DomainRule, EngineError> {
        if host.trim().is_empty() {
            return Err(EngineError::InvalidArgument("domain rule host must be non-empty".to_string()));
        }
        Ok(self.domain_rules.set_rule(host, signal, reason)?)
    }

    // ---- longitudinal queries ----

    fn aggregate(&self) -> Result<Aggregate, EngineError> {
        Ok(Aggregate::load(&self.store)?)
    }

    pub fn recurring_unfinished(&self, min_occurrences: u32, time_range: &str) -> Result<Vec<RecurringTab>, EngineError> {
        Ok(get_recurring_unfinished(&self.aggregate()?, min_occurrences, time_range))
    }

    pub fn project_health(&self, include_abandoned: bool) -> Result<Vec<ProjectHealth>, EngineError> {
        Ok(get_project_health(&self.aggregate()?, include_abandoned))
    }

    pub fn distraction_signature(
        &self,
        time_range: &str,
        mode_filter: Option<SessionMode>,
    ) -> Result<DistractionSignature, EngineError> {
        Ok(get_distraction_signature(&self.aggregate()?, time_range, mode_filter))
    }

    pub fn correction_rates(&self) -> Result<Vec<DomainRate>, EngineError> {
        Ok(CorrectionAnalyzer::new(&self.store).get_correction_rates()?)
    }

    pub fn suggest_extractors(&self) -> Result<Vec<ExtractorSuggestion>, EngineError> {
        Ok(CorrectionAnalyzer::new(&self.store).suggest_extractors(2, 0.3)?)
    }

    // ---- themes ----

    pub fn theme_proposals(&self) -> Result<Vec<Theme>, EngineError> {
        let agg = self.aggregate()?;
        let interests = load_interests(self.config.interests_dir.as_deref());
        let corrections = CorrectionAnalyzer::new(&self.store).get_corrections()?;
        let feedback = self.theme_feedback.load()?;
        Ok(ThemeDetector::default().detect(&agg, &interests, &corrections, &feedback))
    }

    pub fn record_theme_feedback(
        &self,
        theme_id: &str,
        action: ThemeAction,
        renamed_to: Option<String>,
        note: Option<String>,
    ) -> Result<ThemeFeedback, EngineError> {
        Ok(self.theme_feedback.record(theme_id, action, renamed_to, note)?)
    }

    // ---- tasks ----

    pub fn generate_tasks(&self) -> Result<Vec<CandidateTask>, EngineError> {
        let agg = self.aggregate()?;
        let generator = TaskGenerator::new(&self.blocklist, &self.deferrals, &self.paused);
        Ok(generator.generate(&agg)?)
    }

    /// Dispatch a task action by name; writes through to durable state and
    /// the task log.
    pub async fn run_task_action(
        &self,
        task: &CandidateTask,
        action: &str,
        amount: Option<i64>,
    ) -> Result<String, EngineError> {
        let actions = TaskActions::new(&self.store, &self.blocklist, &self.deferrals, &self.paused, &self.task_log);

        let outcome = match (task.task_type, action) {
            (_, "skip") => actions.skip(task).await,
            (TaskType::GhostTab, "engage") => actions.engage_ghost_tab(task).await,
            (TaskType::GhostTab, "release") => actions.release_ghost_tab(task).await,
            (TaskType::GhostTab, "defer") => actions.defer_ghost_tab(task, amount).await,
            (TaskType::ProjectRevival, "engage") => actions.engage_project(task).await,
            (TaskType::ProjectRevival, "pause") => actions.pause_project(task, amount).await,
            (TaskType::TabBankruptcy, "bankruptcy") => actions.declare_bankruptcy(task).await,
            (task_type, action) => {
                return Err(EngineError::InvalidArgument(format!(
                    "action {action:?} does not apply to {task_type} tasks"
                )));
            }
        };
        outcome.map_err(|e| EngineError::Io(e.to_string()))
    }

    pub fn read_task_log(&self) -> Result<Vec<crate::tasks::TaskLogEntry>, EngineError> {
        Ok(self.task_log.read_all()?)
    }
}

/// Convenience constructor rooted at a data directory (tests, CLI)
pub fn open_at(data_dir: impl Into<PathBuf>) -> eyre::Result<Memento> {
    let data_dir = data_dir.into();
    let config = Config {
        prompts_dir: data_dir.join("prompts"),
        memory_dir: data_dir.join("memory"),
        data_dir,
        ..Default::default()
    };
    Memento::open(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockRunner;
    use sessionstore::DispositionAction;
    use tempfile::TempDir;

    const MERMAID: &str = "graph TB\n  t1 --> t2";
    const THEMATIC: &str = r#"{"projectSupport":{},"thematicThroughlines":[],"alternativeNarrative":"","hiddenConnection":"","suggestedActions":[],"sessionPattern":"deep-work"}"#;

    fn pass1(assignments: &str) -> String {
        format!(
            r#"{{"assignments":{assignments},"narrative":"n","sessionIntent":"s","deepDive":[],"overallConfidence":"high","uncertainties":[]}}"#
        )
    }

    fn request(urls: &[&str], mode: SessionMode) -> ClassifyRequest {
        ClassifyRequest {
            tabs: urls
                .iter()
                .map(|u| Tab {
                    url: u.to_string(),
                    title: format!("tab at {u}"),
                    content: String::new(),
                    needs_visual_extraction: false,
                })
                .collect(),
            engine: Some("scripted".to_string()),
            context: None,
            debug_mode: false,
            mode,
        }
    }

    fn engine_with(temp: &TempDir, responses: Vec<String>) -> Memento {
        let strs: Vec<&str> = responses.iter().map(String::as_str).collect();
        open_at(temp.path())
            .unwrap()
            .with_runner("scripted", Arc::new(MockRunner::new(strs)))
    }

    #[tokio::test]
    async fn test_launchpad_capture_takes_lock() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research","2":"News"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
            ],
        );

        let session = engine
            .classify_browser_context(request(&["https://a.example", "https://b.example"], SessionMode::Launchpad))
            .await
            .unwrap();

        let status = engine.get_lock_status();
        assert!(status.locked);
        assert_eq!(status.session_id, session.meta.session_id);
        assert_eq!(status.items_remaining, 2);
    }

    #[tokio::test]
    async fn test_second_launchpad_capture_blocked() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
            ],
        );

        engine
            .classify_browser_context(request(&["https://a.example"], SessionMode::Launchpad))
            .await
            .unwrap();

        let err = engine
            .classify_browser_context(request(&["https://b.example"], SessionMode::Launchpad))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyLocked { .. }));
    }

    #[tokio::test]
    async fn test_clear_lock_precondition_scenario() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research","2":"News"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
            ],
        );

        let session = engine
            .classify_browser_context(request(&["https://a.example", "https://b.example"], SessionMode::Launchpad))
            .await
            .unwrap();
        let id = session.meta.session_id.clone().unwrap();

        // two unresolved items: clear must fail
        let err = engine.clear_session_lock(&id, false).unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));

        engine
            .append_disposition(&id, NewDisposition::new(DispositionAction::Complete, "https://a.example"))
            .unwrap();
        assert_eq!(engine.get_lock_status().items_remaining, 1);

        engine
            .append_disposition(&id, NewDisposition::new(DispositionAction::Complete, "https://b.example"))
            .unwrap();
        engine.clear_session_lock(&id, false).unwrap();
        assert!(!engine.get_lock_status().locked);
    }

    #[tokio::test]
    async fn test_results_capture_takes_no_lock() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
            ],
        );

        engine
            .classify_browser_context(request(&["https://a.example"], SessionMode::Results))
            .await
            .unwrap();
        assert!(!engine.get_lock_status().locked);
    }

    #[tokio::test]
    async fn test_capture_persists_and_lists() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
            ],
        );

        let session = engine
            .classify_browser_context(request(&["https://a.example"], SessionMode::Results))
            .await
            .unwrap();
        assert!(session.meta.session_id.is_some());

        let listed = engine.list_sessions().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].narrative, "n");
    }

    #[tokio::test]
    async fn test_unknown_engine_is_invalid_argument() {
        let temp = TempDir::new().unwrap();
        let engine = open_at(temp.path()).unwrap();
        let mut req = request(&["https://a.example"], SessionMode::Results);
        req.engine = Some("quantum".to_string());

        let err = engine.classify_browser_context(req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_reclassify_writes_artifact() {
        let temp = TempDir::new().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                pass1(r#"{"1":"Research"}"#),
                MERMAID.to_string(),
                THEMATIC.to_string(),
                // reclassification pass
                r#"{"projectSupport":{},"thematicThroughlines":["second look"],"alternativeNarrative":"","hiddenConnection":"","suggestedActions":[],"sessionPattern":"research-loop"}"#.to_string(),
            ],
        );

        let session = engine
            .classify_browser_context(request(&["https://a.example"], SessionMode::Results))
            .await
            .unwrap();
        let id = session.meta.session_id.unwrap();

        let artifact = engine.reclassify(&id, Some("scripted")).await.unwrap();
        assert_eq!(artifact.original_session_id, id);
        assert_eq!(artifact.thematic_analysis.session_pattern, "research-loop");

        let dir = engine.config().reclassifications_dir();
        let files: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_reclassify_missing_session() {
        let temp = TempDir::new().unwrap();
        let engine = open_at(temp.path()).unwrap();
        let err = engine.reclassify("2026-01-01T00-00-00Z", None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}

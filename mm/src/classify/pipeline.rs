//! Four-pass pipeline orchestration

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use sessionstore::{
    CategoryTask, CostBreakdown, DeepDiveResult, GroupItem, Session, SessionMode, TabReasoning, ThematicAnalysis,
    TokenUsage, UNCLASSIFIED,
};

use super::attribution::attribute;
use super::categories::{BASE_CATEGORIES, project_category_label, suggested_action};
use super::context::{AppliedPreference, context_block, match_preferences, preference_lines};
use super::fallback::classify_mock;
use super::parse::{parse_pass1, parse_thematic, repair_json, validate_mermaid};
use super::{ClassifyContext, DEEP_DIVE_CONTENT_CHARS, MAX_TAB_CONTENT_BYTES, Project, Tab};
use crate::config::PricingConfig;
use crate::learning::{DomainRule, PreferenceRule};
use crate::llm::ModelRunner;
use crate::prompts::PromptLoader;

/// Result of one classification run
pub struct ClassifyOutcome {
    pub session: Session,
    /// Preference rules that matched tabs in this capture
    pub applied_preferences: Vec<AppliedPreference>,
}

/// The four-pass classification pipeline
pub struct Classifier {
    runner: Arc<dyn ModelRunner>,
    prompts: PromptLoader,
    pricing: PricingConfig,
    debug: bool,
}

impl Classifier {
    pub fn new(runner: Arc<dyn ModelRunner>, prompts: PromptLoader, pricing: PricingConfig, debug: bool) -> Self {
        Self {
            runner,
            prompts,
            pricing,
            debug,
        }
    }

    /// Run the full pipeline over a capture.
    ///
    /// Never fails: an unrecovered pass 1 error falls through to the keyword
    /// fallback, and pass 2-4 failures are recorded in their result fields.
    pub async fn classify(
        &self,
        tabs: &[Tab],
        mode: SessionMode,
        context: &ClassifyContext,
        preferences: &[PreferenceRule],
        domain_rules: &BTreeMap<String, DomainRule>,
    ) -> ClassifyOutcome {
        let total_start = Instant::now();
        let tabs = clamp_content(tabs);
        let applied_preferences = match_preferences(preferences, &tabs);

        let mut session = Session::new(mode, tabs.len() as u32);
        let engine = self.runner.info();
        session.meta.engine = engine.engine;
        session.meta.model = engine.model;
        session.meta.endpoint = engine.endpoint;
        session.meta.source = "llm".to_string();

        if tabs.is_empty() {
            debug!("classify: empty capture, skipping model passes");
            session.meta.passes = 1;
            session.meta.timing.total = total_start.elapsed().as_millis() as u64;
            return ClassifyOutcome {
                session,
                applied_preferences,
            };
        }

        let mut usage = TokenUsage::default();
        let mut saw_usage = false;
        let mut raw_passes = serde_json::Map::new();

        // ---- Pass 1: classify and triage ----
        let pass_start = Instant::now();
        let pass1 = match self.run_pass1(&tabs, context, preferences).await {
            Ok((output, raw, pass_usage)) => {
                if let Some(u) = pass_usage {
                    usage.add(u);
                    saw_usage = true;
                }
                if self.debug {
                    raw_passes.insert("pass1".to_string(), Value::String(raw));
                }
                output
            }
            Err(e) => {
                warn!(error = %e, "Pass 1 unrecoverable, falling back to keyword classifier");
                return self.fallback(&tabs, mode, applied_preferences, total_start);
            }
        };
        session.meta.timing.pass1 = Some(pass_start.elapsed().as_millis() as u64);

        apply_pass1(&mut session, &tabs, &pass1);

        // ---- Pass 2: deep dive (conditional per flagged tab) ----
        let pass_start = Instant::now();
        for request in session.deep_dive.clone() {
            let index = request.tab_index;
            if index < 1 || index as usize > tabs.len() {
                warn!(tab_index = index, "Deep-dive request out of range, skipping");
                continue;
            }
            let tab = &tabs[index as usize - 1];
            let result = match self.run_deep_dive(tab, &request.reason, &request.extract_hints).await {
                Ok((analysis, raw, pass_usage)) => {
                    if let Some(u) = pass_usage {
                        usage.add(u);
                        saw_usage = true;
                    }
                    if self.debug {
                        raw_passes.insert(format!("pass2-tab{index}"), Value::String(raw));
                    }
                    DeepDiveResult {
                        url: tab.url.clone(),
                        title: tab.title.clone(),
                        analysis: Some(analysis),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(tab_index = index, error = %e, "Deep dive failed for tab, continuing");
                    DeepDiveResult {
                        url: tab.url.clone(),
                        title: tab.title.clone(),
                        analysis: None,
                        error: Some(e),
                    }
                }
            };
            session.deep_dive_results.push(result);
        }
        session.meta.timing.pass2 = Some(pass_start.elapsed().as_millis() as u64);

        // ---- Pass 3: visualization ----
        let pass_start = Instant::now();
        let failed: Vec<&DeepDiveResult> = session.deep_dive_results.iter().filter(|r| r.error.is_some()).collect();
        session.visualization.failures_visualized = failed.len() as u32;
        match self.run_visualization(&session).await {
            Ok((mermaid, raw, pass_usage)) => {
                if let Some(u) = pass_usage {
                    usage.add(u);
                    saw_usage = true;
                }
                if self.debug {
                    raw_passes.insert("pass3".to_string(), Value::String(raw));
                }
                session.visualization.mermaid = Some(mermaid);
            }
            Err(e) => {
                warn!(error = %e, "Visualization pass failed");
                session.visualization.mermaid = None;
                session.visualization.error = Some(e);
            }
        }
        session.meta.timing.pass3 = Some(pass_start.elapsed().as_millis() as u64);

        // ---- Pass 4: thematic analysis (always runs) ----
        let pass_start = Instant::now();
        match self
            .run_thematic(&session, &context.active_projects)
            .await
        {
            Ok((thematic, raw, pass_usage)) => {
                if let Some(u) = pass_usage {
                    usage.add(u);
                    saw_usage = true;
                }
                if self.debug {
                    raw_passes.insert("pass4".to_string(), Value::String(raw));
                }
                session.thematic_analysis = thematic;
            }
            Err(e) => {
                warn!(error = %e, "Thematic pass failed");
                session.thematic_analysis = ThematicAnalysis {
                    error: Some(e),
                    ..Default::default()
                };
            }
        }
        session.meta.timing.pass4 = Some(pass_start.elapsed().as_millis() as u64);

        session.meta.passes = 4;
        session.meta.timing.total = total_start.elapsed().as_millis() as u64;
        if saw_usage {
            session.meta.usage = Some(usage);
            session.meta.cost = Some(compute_cost(usage, self.pricing));
        }

        if self.debug {
            session.trace = Some(json!({
                "attribution": attribute(&tabs, &context.active_projects, domain_rules),
                "passes": Value::Object(raw_passes),
            }));
        }

        info!(
            tabs = tabs.len(),
            classified = session.classified_count,
            groups = session.groups.len(),
            deep_dives = session.deep_dive_results.len(),
            "Classification pipeline complete"
        );

        ClassifyOutcome {
            session,
            applied_preferences,
        }
    }

    /// Pass 4 alone against an existing session, for reclassification flows
    pub async fn run_thematic_pass(&self, session: &Session, projects: &[Project]) -> ThematicAnalysis {
        match self.run_thematic(session, projects).await {
            Ok((thematic, _, _)) => thematic,
            Err(e) => ThematicAnalysis {
                error: Some(e),
                ..Default::default()
            },
        }
    }

    async fn run_pass1(
        &self,
        tabs: &[Tab],
        context: &ClassifyContext,
        preferences: &[PreferenceRule],
    ) -> Result<(super::parse::Pass1Output, String, Option<TokenUsage>), String> {
        let tab_lines: Vec<String> = tabs
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {} | {}", i + 1, t.title, t.url))
            .collect();

        let mut category_lines: Vec<String> = BASE_CATEGORIES.iter().map(|c| format!("- {c}")).collect();
        for project in &context.active_projects {
            category_lines.push(format!("- {}", project_category_label(project)));
        }

        let prompt = self
            .prompts
            .render(
                "classify",
                &json!({
                    "context_block": context_block(&context.active_projects),
                    "preference_lines": preference_lines(preferences),
                    "tab_lines": tab_lines.join("\n"),
                    "category_lines": category_lines.join("\n"),
                    "tab_count": tabs.len(),
                }),
            )
            .map_err(|e| e.to_string())?;

        let output = self.runner.run(&prompt).await.map_err(|e| e.to_string())?;
        let parsed = parse_pass1(&output.text).map_err(|e| e.to_string())?;
        Ok((parsed, output.text, output.usage))
    }

    async fn run_deep_dive(
        &self,
        tab: &Tab,
        reason: &str,
        hints: &[String],
    ) -> Result<(Value, String, Option<TokenUsage>), String> {
        let content: String = tab.content.chars().take(DEEP_DIVE_CONTENT_CHARS).collect();
        let prompt = self
            .prompts
            .render(
                "deepdive",
                &json!({
                    "url": tab.url,
                    "title": tab.title,
                    "reason": reason,
                    "hints": hints.join(", "),
                    "content": content,
                }),
            )
            .map_err(|e| e.to_string())?;

        let output = self.runner.run(&prompt).await.map_err(|e| e.to_string())?;
        let analysis = repair_json(&output.text).map_err(|e| e.to_string())?;
        Ok((analysis, output.text, output.usage))
    }

    async fn run_visualization(&self, session: &Session) -> Result<(String, String, Option<TokenUsage>), String> {
        let group_lines: Vec<String> = session
            .groups
            .iter()
            .map(|(category, items)| {
                let titles: Vec<String> = items.iter().map(|i| truncate_chars(&i.title, 40)).collect();
                format!("- {category} ({}): {}", items.len(), titles.join("; "))
            })
            .collect();

        let insight_lines: Vec<String> = session
            .deep_dive_results
            .iter()
            .filter_map(|r| {
                r.analysis.as_ref().map(|a| {
                    let summary = a.get("summary").and_then(Value::as_str).unwrap_or("analyzed");
                    format!("- {}: {}", truncate_chars(&r.title, 40), truncate_chars(summary, 80))
                })
            })
            .collect();

        let failed_lines: Vec<String> = session
            .deep_dive_results
            .iter()
            .filter(|r| r.error.is_some())
            .map(|r| format!("- {}", truncate_chars(&r.title, 40)))
            .collect();

        let prompt = self
            .prompts
            .render(
                "visualize",
                &json!({
                    "narrative": session.narrative,
                    "group_lines": group_lines.join("\n"),
                    "insight_lines": insight_lines.join("\n"),
                    "failed_lines": failed_lines.join("\n"),
                }),
            )
            .map_err(|e| e.to_string())?;

        let output = self.runner.run(&prompt).await.map_err(|e| e.to_string())?;
        let mermaid = validate_mermaid(&output.text)?;
        Ok((mermaid, output.text, output.usage))
    }

    async fn run_thematic(
        &self,
        session: &Session,
        projects: &[Project],
    ) -> Result<(ThematicAnalysis, String, Option<TokenUsage>), String> {
        let group_lines: Vec<String> = session
            .groups
            .iter()
            .map(|(category, items)| {
                let titles: Vec<String> = items.iter().map(|i| truncate_chars(&i.title, 60)).collect();
                format!("- {category}: {}", titles.join("; "))
            })
            .collect();

        let (template, ctx) = if projects.is_empty() {
            (
                "themes-simple",
                json!({
                    "narrative": session.narrative,
                    "session_intent": session.session_intent,
                    "group_lines": group_lines.join("\n"),
                }),
            )
        } else {
            let project_lines: Vec<String> = projects
                .iter()
                .map(|p| format!("- {} (keywords: {})", p.name, p.keywords.join(", ")))
                .collect();
            (
                "themes",
                json!({
                    "narrative": session.narrative,
                    "session_intent": session.session_intent,
                    "group_lines": group_lines.join("\n"),
                    "project_lines": project_lines.join("\n"),
                }),
            )
        };

        let prompt = self.prompts.render(template, &ctx).map_err(|e| e.to_string())?;
        let output = self.runner.run(&prompt).await.map_err(|e| e.to_string())?;
        let thematic = parse_thematic(&output.text).map_err(|e| e.to_string())?;
        Ok((thematic, output.text, output.usage))
    }

    /// Build a complete mock-classified session after a pass 1 failure
    fn fallback(
        &self,
        tabs: &[Tab],
        mode: SessionMode,
        applied_preferences: Vec<AppliedPreference>,
        total_start: Instant,
    ) -> ClassifyOutcome {
        let mock = classify_mock(tabs);

        let mut session = Session::new(mode, tabs.len() as u32);
        let engine = self.runner.info();
        session.meta.engine = engine.engine;
        session.meta.model = engine.model;
        session.meta.endpoint = engine.endpoint;
        session.meta.source = "mock".to_string();
        session.meta.passes = 1;

        session.classified_count = mock.groups.values().map(|v| v.len() as u32).sum();
        session.groups = mock.groups;
        session.reasoning.per_tab = mock.per_tab;
        session.reasoning.overall_confidence = "low".to_string();
        session.narrative = mock.narrative;
        session.session_intent = "Unknown (heuristic classification)".to_string();
        session.tasks = derive_tasks(&session.groups);
        session.meta.timing.total = total_start.elapsed().as_millis() as u64;

        ClassifyOutcome {
            session,
            applied_preferences,
        }
    }
}

/// Enforce the 8KB content contract on intake
fn clamp_content(tabs: &[Tab]) -> Vec<Tab> {
    tabs.iter()
        .map(|t| {
            let mut tab = t.clone();
            if tab.content.len() > MAX_TAB_CONTENT_BYTES {
                let mut cut = MAX_TAB_CONTENT_BYTES;
                while cut > 0 && !tab.content.is_char_boundary(cut) {
                    cut -= 1;
                }
                tab.content.truncate(cut);
            }
            tab
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Fold the parsed pass 1 output into the session artifact, force-assigning
/// any tabs the model skipped
fn apply_pass1(session: &mut Session, tabs: &[Tab], pass1: &super::parse::Pass1Output) {
    let mut classified = 0u32;

    for (i, tab) in tabs.iter().enumerate() {
        let index = i as u32 + 1;
        let key = index.to_string();

        let (category, signals, confidence) = match pass1.assignments.get(&key) {
            Some(a) if !a.category().trim().is_empty() && a.category() != UNCLASSIFIED => {
                classified += 1;
                (a.category().to_string(), a.signals(), a.confidence())
            }
            _ => {
                warn!(tab_index = index, title = %tab.title, "Tab missing from model output, assigning Unclassified");
                (UNCLASSIFIED.to_string(), Vec::new(), "none".to_string())
            }
        };

        session.groups.entry(category.clone()).or_default().push(GroupItem {
            tab_index: index,
            title: tab.title.clone(),
            url: tab.url.clone(),
        });
        session.reasoning.per_tab.insert(
            key,
            TabReasoning {
                category,
                signals,
                confidence,
                title: tab.title.clone(),
                url: tab.url.clone(),
            },
        );
    }

    for key in pass1.assignments.keys() {
        let in_range = key.parse::<u32>().map(|k| k >= 1 && k <= tabs.len() as u32).unwrap_or(false);
        if !in_range {
            warn!(%key, "Model returned an assignment for a tab that does not exist");
        }
    }

    session.classified_count = classified;
    session.narrative = pass1.narrative.clone();
    session.session_intent = pass1.session_intent.clone();
    session.deep_dive = pass1.deep_dive.clone();
    session.reasoning.overall_confidence = pass1.overall_confidence.clone();
    session.reasoning.uncertainties = pass1.uncertainties.clone();
    session.tasks = derive_tasks(&session.groups);
}

fn derive_tasks(groups: &BTreeMap<String, Vec<GroupItem>>) -> Vec<CategoryTask> {
    groups
        .iter()
        .filter(|(category, _)| category.as_str() != UNCLASSIFIED)
        .map(|(category, items)| CategoryTask {
            category: category.clone(),
            suggested_action: suggested_action(category).to_string(),
            tab_count: items.len() as u32,
        })
        .collect()
}

fn compute_cost(usage: TokenUsage, pricing: PricingConfig) -> CostBreakdown {
    let input = usage.input_tokens as f64 / 1_000_000.0 * pricing.input_per_mtok;
    let output = usage.output_tokens as f64 / 1_000_000.0 * pricing.output_per_mtok;
    CostBreakdown {
        input,
        output,
        total: input + output,
    }
}

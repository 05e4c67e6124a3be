use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use memento::cli::{Cli, Command};
use memento::{ClassifyRequest, Config, Memento};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let engine = Memento::open(config).context("Failed to open engine")?;

    info!("memento starting");

    match cli.command {
        Command::Classify { payload } => {
            let content = std::fs::read_to_string(&payload)
                .context(format!("Failed to read payload: {}", payload.display()))?;
            let request: ClassifyRequest = serde_json::from_str(&content).context("Invalid capture payload")?;
            let session = engine.classify_browser_context(request).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Command::Status => {
            let status = engine.get_lock_status();
            if status.locked {
                println!(
                    "{} locked by {} ({} items remaining)",
                    "●".red(),
                    status.session_id.unwrap_or_default().cyan(),
                    status.items_remaining
                );
            } else {
                println!("{} unlocked", "○".green());
            }
        }
        Command::ClearLock { session_id, r#override } => {
            engine.clear_session_lock(&session_id, r#override)?;
            println!("{} Lock cleared", "✓".green());
        }
        Command::Tasks => {
            let tasks = engine.generate_tasks()?;
            if tasks.is_empty() {
                println!("Nothing needs attention");
            } else {
                for task in tasks {
                    println!(
                        "{:>7.1}  {}  {}",
                        task.score,
                        task.task_type.to_string().yellow(),
                        task.title
                    );
                }
            }
        }
        Command::Themes => {
            let themes = engine.theme_proposals()?;
            if themes.is_empty() {
                println!("No themes detected yet");
            } else {
                for theme in themes {
                    println!(
                        "{:>7.1}  {}  ({} urls)  {}",
                        theme.score,
                        theme.label.cyan(),
                        theme.urls.len(),
                        theme.status.dimmed()
                    );
                }
            }
        }
        Command::Ghosts {
            min_occurrences,
            time_range,
        } => {
            for ghost in engine.recurring_unfinished(min_occurrences, &time_range)? {
                println!(
                    "{:>3}x  {}  {}",
                    ghost.times_seen,
                    ghost.url.cyan(),
                    format!("every ~{:.1}d", ghost.avg_gap_days).dimmed()
                );
            }
        }
        Command::Projects { include_abandoned } => {
            for health in engine.project_health(include_abandoned)? {
                println!(
                    "{:>10}  {}  {} sessions, {} tabs, quiet {}d",
                    serde_json::to_string(&health.status)?.trim_matches('"').yellow(),
                    health.project.cyan(),
                    health.total_sessions,
                    health.total_tabs,
                    health.days_since_active
                );
            }
        }
        Command::Distraction { time_range } => {
            let signature = engine.distraction_signature(&time_range, None)?;
            println!("{}", serde_json::to_string_pretty(&signature)?);
        }
        Command::Preferences => {
            let (file, suggestions) = engine.list_preferences()?;
            for rule in &file.rules {
                let marker = if rule.approved { "✓".green() } else { "·".dimmed() };
                println!("{marker} {}  {}", rule.id.cyan(), rule.rule);
            }
            for suggestion in &suggestions {
                println!(
                    "{} {}  {} ({:.0}% agreement)",
                    "?".yellow(),
                    suggestion.id.cyan(),
                    suggestion.rule,
                    suggestion.confidence * 100.0
                );
            }
            if file.rules.is_empty() && suggestions.is_empty() {
                println!("No rules yet");
            }
        }
        Command::Reclassify { session_id } => {
            let artifact = engine.reclassify(&session_id, None).await?;
            println!("{}", serde_json::to_string_pretty(&artifact)?);
        }
    }

    Ok(())
}

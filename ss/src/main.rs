use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::path::PathBuf;

use sessionstore::SessionStore;
use sessionstore::cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn default_sessions_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memento")
        .join("sessions")
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let dir = cli.dir.unwrap_or_else(default_sessions_dir);

    info!("sessionstore starting");

    let store = SessionStore::open(&dir).context("Failed to open session store")?;

    match cli.command {
        Command::List => {
            let summaries = store.list()?;
            if summaries.is_empty() {
                println!("No sessions found");
            } else {
                for s in summaries {
                    println!(
                        "{}  {} tabs  {}",
                        s.id.cyan(),
                        s.tab_count.to_string().yellow(),
                        s.narrative.dimmed()
                    );
                }
            }
        }
        Command::Show { session_id, applied } => {
            if applied {
                let view = store.get_session_with_dispositions_applied(&session_id)?;
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                let view = store.get_session_with_dispositions(&session_id)?;
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        Command::Search { query } => {
            let hits = store.search(&query)?;
            if hits.is_empty() {
                println!("No matches");
            } else {
                for hit in hits {
                    println!("{}  …{}…", hit.summary.id.cyan(), hit.context);
                }
            }
        }
        Command::Dispositions { session_id } => {
            let log = store.get_dispositions(&session_id)?;
            for d in log {
                println!(
                    "{}  {}  {}",
                    d.at.to_rfc3339().dimmed(),
                    d.action.to_string().yellow(),
                    d.item_id
                );
            }
        }
        Command::Verify { session_id } => {
            let ids: Vec<String> = match session_id {
                Some(id) => vec![id],
                None => store.list()?.into_iter().map(|s| s.id).collect(),
            };
            let mut failures = 0;
            for id in ids {
                match store.read(&id)? {
                    Some(session) => {
                        let problems = session.verify();
                        if problems.is_empty() {
                            println!("{} {}", "✓".green(), id);
                        } else {
                            failures += 1;
                            println!("{} {}", "✗".red(), id);
                            for p in problems {
                                println!("    {p}");
                            }
                        }
                    }
                    None => {
                        failures += 1;
                        println!("{} {} (not found)", "✗".red(), id);
                    }
                }
            }
            if failures > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

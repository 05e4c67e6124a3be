//! CLI argument parsing for the memento engine

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mm")]
#[command(author, version, about = "Session-based tab triage engine", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a capture payload from a JSON file
    Classify {
        /// Path to a JSON file with the capture request
        #[arg(required = true)]
        payload: PathBuf,
    },

    /// Show lock status
    Status,

    /// Clear the capture lock
    ClearLock {
        /// Session id that holds the lock
        #[arg(required = true)]
        session_id: String,

        /// Clear even if items are unresolved or the id does not match
        #[arg(long)]
        r#override: bool,
    },

    /// List ranked candidate tasks
    Tasks,

    /// Show active theme proposals
    Themes,

    /// Recurring unfinished tabs (ghosts)
    Ghosts {
        /// Minimum distinct sessions
        #[arg(short, long, default_value = "2")]
        min_occurrences: u32,

        /// Time range: all, week, month, or <N>d
        #[arg(short, long, default_value = "all")]
        time_range: String,
    },

    /// Project health report
    Projects {
        /// Include abandoned projects
        #[arg(long)]
        include_abandoned: bool,
    },

    /// Distraction signature
    Distraction {
        /// Time range: all, week, month, or <N>d
        #[arg(short, long, default_value = "all")]
        time_range: String,
    },

    /// List stored preference rules and fresh suggestions
    Preferences,

    /// Run the thematic pass again for a stored session
    Reclassify {
        /// Session id
        #[arg(required = true)]
        session_id: String,
    },
}

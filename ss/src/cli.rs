//! CLI argument parsing for sessionstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Session artifact store inspector", long_about = None)]
pub struct Cli {
    /// Path to the sessions directory (default: ~/.memento/sessions)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List sessions, newest first
    List,

    /// Print a full session artifact
    Show {
        /// Session id
        #[arg(required = true)]
        session_id: String,

        /// Apply dispositions before printing (reshaped groups)
        #[arg(short, long)]
        applied: bool,
    },

    /// Search across all artifacts
    Search {
        /// Substring to look for (case-insensitive)
        #[arg(required = true)]
        query: String,
    },

    /// Print a session's disposition log
    Dispositions {
        /// Session id
        #[arg(required = true)]
        session_id: String,
    },

    /// Check a session's structural invariants
    Verify {
        /// Session id; verifies every session when omitted
        session_id: Option<String>,
    },
}

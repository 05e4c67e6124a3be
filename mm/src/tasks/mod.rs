//! Task layer: ranked attention prompts and their write-through actions

mod actions;
mod generator;
mod state;

pub use actions::{DEFAULT_DEFER_HOURS, DEFAULT_PAUSE_DAYS, SKIP_DEFER_HOURS, TaskActions};
pub use generator::{BANKRUPTCY_THRESHOLD, CandidateTask, STALE_DAYS, TaskGenerator, TaskType};
pub use state::{Blocklist, DeferralStore, PausedProjects, TaskLog, TaskLogEntry};

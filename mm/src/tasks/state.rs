//! Durable task state
//!
//! The write-side companions of the task layer: the release blocklist,
//! time-bound deferrals, paused projects, and the append-only task log.
//! Each lives in its own user-scoped file behind its own mutex.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::fsutil::{read_json_or_default, write_json};

/// URLs the user has permanently released; never surfaced as tasks again
pub struct Blocklist {
    path: PathBuf,
    guard: Mutex<()>,
}

impl Blocklist {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn load(&self) -> eyre::Result<BTreeSet<String>> {
        read_json_or_default(&self.path)
    }

    pub fn add(&self, url: &str) -> eyre::Result<()> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut urls: BTreeSet<String> = read_json_or_default(&self.path)?;
        if urls.insert(url.to_string()) {
            write_json(&self.path, &urls)?;
            info!(%url, "Added URL to blocklist");
        }
        Ok(())
    }

    pub fn contains(&self, url: &str) -> eyre::Result<bool> {
        Ok(self.load()?.contains(url))
    }
}

/// Keys (URLs or task ids) deferred until a point in time
pub struct DeferralStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl DeferralStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    /// Defer a key for `hours` from now
    pub fn defer(&self, key: &str, hours: i64) -> eyre::Result<DateTime<Utc>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut deferrals: BTreeMap<String, DateTime<Utc>> = read_json_or_default(&self.path)?;
        let until = Utc::now() + Duration::hours(hours);
        deferrals.insert(key.to_string(), until);
        write_json(&self.path, &deferrals)?;
        debug!(%key, %until, "Deferred");
        Ok(until)
    }

    /// Active (unexpired) deferrals; expired entries are pruned on read
    pub fn load_active(&self) -> eyre::Result<BTreeMap<String, DateTime<Utc>>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut deferrals: BTreeMap<String, DateTime<Utc>> = read_json_or_default(&self.path)?;
        let now = Utc::now();
        let before = deferrals.len();
        deferrals.retain(|_, until| *until > now);
        if deferrals.len() != before {
            write_json(&self.path, &deferrals)?;
        }
        Ok(deferrals)
    }

    pub fn is_deferred(&self, key: &str) -> eyre::Result<bool> {
        Ok(self.load_active()?.contains_key(key))
    }
}

/// Projects paused from task generation until a point in time
pub struct PausedProjects {
    path: PathBuf,
    guard: Mutex<()>,
}

impl PausedProjects {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn pause(&self, project: &str, days: i64) -> eyre::Result<DateTime<Utc>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut paused: BTreeMap<String, DateTime<Utc>> = read_json_or_default(&self.path)?;
        let until = Utc::now() + Duration::days(days);
        paused.insert(project.to_string(), until);
        write_json(&self.path, &paused)?;
        info!(%project, %until, "Paused project");
        Ok(until)
    }

    pub fn load_active(&self) -> eyre::Result<BTreeSet<String>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut paused: BTreeMap<String, DateTime<Utc>> = read_json_or_default(&self.path)?;
        let now = Utc::now();
        let before = paused.len();
        paused.retain(|_, until| *until > now);
        if paused.len() != before {
            write_json(&self.path, &paused)?;
        }
        Ok(paused.into_keys().collect())
    }
}

/// One row in the append-only task action log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLogEntry {
    pub task_id: String,
    pub task_type: String,
    pub action: String,
    pub at: DateTime<Utc>,
    /// Snapshot of the task as presented to the user
    pub task: Value,
    pub outcome: String,
}

/// Append-only JSONL log of every task action
pub struct TaskLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl TaskLog {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn append(&self, entry: &TaskLogEntry) -> eyre::Result<()> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        debug!(task = %entry.task_id, action = %entry.action, "Logged task action");
        Ok(())
    }

    /// Read the whole log; malformed lines are skipped with a warning
    pub fn read_all(&self) -> eyre::Result<Vec<TaskLogEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line, error = %e, "Skipping malformed task log line"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_blocklist_add_and_contains() {
        let temp = TempDir::new().unwrap();
        let blocklist = Blocklist::open(temp.path().join("released-urls.json"));

        assert!(!blocklist.contains("https://a.example").unwrap());
        blocklist.add("https://a.example").unwrap();
        blocklist.add("https://a.example").unwrap(); // idempotent
        assert!(blocklist.contains("https://a.example").unwrap());
        assert_eq!(blocklist.load().unwrap().len(), 1);
    }

    #[test]
    fn test_deferral_expires() {
        let temp = TempDir::new().unwrap();
        let deferrals = DeferralStore::open(temp.path().join("deferred-tasks.json"));

        deferrals.defer("https://later.example", 24).unwrap();
        deferrals.defer("https://past.example", -1).unwrap();

        let active = deferrals.load_active().unwrap();
        assert!(active.contains_key("https://later.example"));
        assert!(!active.contains_key("https://past.example"));
        assert!(deferrals.is_deferred("https://later.example").unwrap());
        assert!(!deferrals.is_deferred("https://past.example").unwrap());
    }

    #[test]
    fn test_paused_projects_expire() {
        let temp = TempDir::new().unwrap();
        let paused = PausedProjects::open(temp.path().join("paused-projects.json"));

        paused.pause("thesis", 30).unwrap();
        paused.pause("old-project", -1).unwrap();

        let active = paused.load_active().unwrap();
        assert!(active.contains("thesis"));
        assert!(!active.contains("old-project"));
    }

    #[test]
    fn test_task_log_appends_in_order() {
        let temp = TempDir::new().unwrap();
        let log = TaskLog::open(temp.path().join("task-log.jsonl"));

        for (i, action) in ["engage", "skip"].iter().enumerate() {
            log.append(&TaskLogEntry {
                task_id: format!("task-{i}"),
                task_type: "ghost_tab".to_string(),
                action: action.to_string(),
                at: Utc::now(),
                task: json!({"url": "https://a.example"}),
                outcome: "ok".to_string(),
            })
            .unwrap();
        }

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "engage");
        assert_eq!(entries[1].action, "skip");
    }

    #[test]
    fn test_task_log_skips_malformed_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("task-log.jsonl");
        std::fs::write(&path, "{ not json\n").unwrap();

        let log = TaskLog::open(&path);
        log.append(&TaskLogEntry {
            task_id: "task-1".to_string(),
            task_type: "ghost_tab".to_string(),
            action: "defer".to_string(),
            at: Utc::now(),
            task: json!({}),
            outcome: "ok".to_string(),
        })
        .unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }
}

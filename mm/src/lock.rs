//! Capture lock manager
//!
//! A single-slot exclusive lock stored in one user-scoped file. Launchpad
//! captures are gated on it: while a session holds the lock, no new
//! Launchpad capture may start. Mutations are serialized by a process-local
//! mutex plus an advisory OS lock on a sidecar guard file, so two processes
//! cannot interleave read-modify-write cycles.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Already locked by session {holder}")]
    AlreadyLocked { holder: String },

    #[error("Lock is held by session {holder}, not the caller")]
    SessionIdMismatch { holder: String },

    #[error("No lock is currently held")]
    NotLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The single persisted lock record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub session_id: String,
    pub locked_at: DateTime<Utc>,
    pub items_remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<Value>,
}

/// Status view: what callers see, lock held or not
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    pub items_remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<Value>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            session_id: None,
            locked_at: None,
            items_remaining: 0,
            resume_state: None,
        }
    }
}

/// Single-slot lock over a file path
pub struct LockManager {
    path: PathBuf,
    guard: Mutex<()>,
}

impl LockManager {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opened lock manager");
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    /// Acquire the OS-level advisory lock for the duration of a mutation
    fn os_guard(&self) -> Result<File, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let guard_path = self.path.with_extension("json.lock");
        let file = OpenOptions::new().create(true).write(true).open(guard_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_record(&self) -> Result<Option<LockRecord>, LockError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, record: &LockRecord) -> Result<(), LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Current lock state. Reads fail open: a missing or unreadable file
    /// reports unlocked rather than blocking the UI.
    pub fn get_lock_status(&self) -> LockStatus {
        match self.read_record() {
            Ok(Some(record)) => LockStatus {
                locked: true,
                session_id: Some(record.session_id),
                locked_at: Some(record.locked_at),
                items_remaining: record.items_remaining,
                resume_state: record.resume_state,
            },
            Ok(None) => LockStatus::unlocked(),
            Err(e) => {
                warn!(error = %e, "Lock file unreadable, reporting unlocked");
                LockStatus::unlocked()
            }
        }
    }

    /// Take the lock for a session. Fails with the current holder when a
    /// lock already exists.
    pub fn acquire_lock(&self, session_id: &str, items_remaining: u32) -> Result<LockRecord, LockError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _os = self.os_guard()?;

        if let Some(existing) = self.read_record()? {
            return Err(LockError::AlreadyLocked {
                holder: existing.session_id,
            });
        }

        let record = LockRecord {
            session_id: session_id.to_string(),
            locked_at: Utc::now(),
            items_remaining,
            resume_state: None,
        };
        self.write_record(&record)?;
        info!(%session_id, items_remaining, "Acquired capture lock");
        Ok(record)
    }

    /// Release the lock. Clearing an absent lock is idempotent success; a
    /// non-override clear must come from the holding session.
    pub fn clear_lock(&self, session_id: &str, override_holder: bool) -> Result<(), LockError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _os = self.os_guard()?;

        let Some(existing) = self.read_record()? else {
            debug!("clear_lock: no lock held, idempotent success");
            return Ok(());
        };

        if !override_holder && existing.session_id != session_id {
            return Err(LockError::SessionIdMismatch {
                holder: existing.session_id,
            });
        }

        fs::remove_file(&self.path)?;
        info!(%session_id, override_holder, "Cleared capture lock");
        Ok(())
    }

    /// Update the unresolved-items counter on the held lock
    pub fn update_items_remaining(&self, items_remaining: u32) -> Result<LockRecord, LockError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _os = self.os_guard()?;

        let mut record = self.read_record()?.ok_or(LockError::NotLocked)?;
        record.items_remaining = items_remaining;
        self.write_record(&record)?;
        debug!(items_remaining, "Updated lock items remaining");
        Ok(record)
    }

    /// Merge partial resume state into the held lock and stamp activity
    pub fn update_resume_state(&self, partial: Value) -> Result<LockRecord, LockError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _os = self.os_guard()?;

        let mut record = self.read_record()?.ok_or(LockError::NotLocked)?;

        let mut state = match record.resume_state.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Value::Object(partial) = partial {
            for (k, v) in partial {
                state.insert(k, v);
            }
        }
        state.insert("lastActivity".to_string(), Value::String(Utc::now().to_rfc3339()));
        record.resume_state = Some(Value::Object(state));

        self.write_record(&record)?;
        debug!("Updated lock resume state");
        Ok(record)
    }
}

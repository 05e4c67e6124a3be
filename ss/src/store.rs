//! Core SessionStore implementation
//!
//! Persists one JSON artifact per session under a base directory. Filenames
//! are derived from the capture timestamp, so lexicographic order is
//! chronological order. Writes go through write-then-rename so readers never
//! observe a partial artifact.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::path::session_path;
use crate::session::{Session, SessionId};

/// Summary row returned by [`SessionStore::list`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub tab_count: u32,
    pub narrative: String,
    pub session_pattern: String,
}

impl SessionSummary {
    fn of(id: SessionId, session: &Session) -> Self {
        Self {
            id,
            timestamp: session.timestamp,
            tab_count: session.total_tabs,
            narrative: session.narrative.clone(),
            session_pattern: session.thematic_analysis.session_pattern.clone(),
        }
    }
}

/// One match from [`SessionStore::search`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub summary: SessionSummary,
    /// ±50 characters around the first match
    pub context: String,
}

/// Directory-backed store of session artifacts
pub struct SessionStore {
    base_dir: PathBuf,
    /// Per-session append guards; concurrent appends to the same session
    /// serialize here, different sessions proceed in parallel
    session_guards: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionStore {
    /// Open or create a session store at the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        debug!(base_dir = %base_dir.display(), "Opened session store");
        Ok(Self {
            base_dir,
            session_guards: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the append guard for a session, creating it on first use
    pub(crate) fn guard_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut guards = self.session_guards.lock().unwrap_or_else(|e| e.into_inner());
        guards.entry(session_id.to_string()).or_default().clone()
    }

    /// Persist a new session artifact; returns the assigned id.
    ///
    /// The id is derived from the artifact timestamp. IO failure is
    /// non-fatal: the error is logged and `None` returned so a classification
    /// result can still be served to the caller.
    pub fn save(&self, session: &mut Session) -> Option<SessionId> {
        let id = session.id();
        session.meta.session_id = Some(id.clone());

        match self.write(&id, session) {
            Ok(()) => {
                info!(%id, tabs = session.total_tabs, "Saved session");
                Some(id)
            }
            Err(e) => {
                warn!(%id, error = %e, "Failed to save session");
                None
            }
        }
    }

    /// Serialize and atomically replace the artifact file for `session_id`
    pub(crate) fn write(&self, session_id: &str, session: &Session) -> Result<(), StoreError> {
        let path = session_path(&self.base_dir, session_id)?;
        let json = serde_json::to_string_pretty(session)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(())
    }

    /// Read a full artifact; `Ok(None)` when the session does not exist
    pub fn read(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let path = session_path(&self.base_dir, session_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// List session summaries, newest first; malformed files are skipped
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                    continue;
                };
                match fs::read_to_string(&path)
                    .map_err(StoreError::from)
                    .and_then(|c| serde_json::from_str::<Session>(&c).map_err(StoreError::from))
                {
                    Ok(session) => summaries.push(SessionSummary::of(id, &session)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping malformed session file");
                    }
                }
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(count = summaries.len(), "Listed sessions");
        Ok(summaries)
    }

    /// The most recent session, fully loaded
    pub fn get_latest(&self) -> Result<Option<Session>, StoreError> {
        match self.list()?.first() {
            Some(summary) => self.read(&summary.id),
            None => Ok(None),
        }
    }

    /// Load every parseable session, oldest first (for longitudinal scans)
    pub fn load_all(&self) -> Result<Vec<(SessionId, Session)>, StoreError> {
        let mut sessions = Vec::new();
        for summary in self.list()? {
            if let Some(session) = self.read(&summary.id)? {
                sessions.push((summary.id, session));
            }
        }
        sessions.reverse();
        Ok(sessions)
    }

    /// Case-insensitive substring search over the serialized artifacts.
    ///
    /// Matching is done on the lowercased JSON; the returned context window
    /// comes from that same serialization.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for summary in self.list()? {
            let Some(session) = self.read(&summary.id)? else {
                continue;
            };
            let haystack = serde_json::to_string_pretty(&session)?.to_lowercase();
            if let Some(pos) = haystack.find(&needle) {
                let start = floor_char_boundary(&haystack, pos.saturating_sub(50));
                let end = floor_char_boundary(&haystack, (pos + needle.len() + 50).min(haystack.len()));
                hits.push(SearchHit {
                    summary,
                    context: haystack[start..end].to_string(),
                });
            }
        }

        debug!(query, count = hits.len(), "Search complete");
        Ok(hits)
    }
}

/// Largest char boundary <= idx
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Write-then-rename so a concurrent reader sees the old or the new file,
/// never a torn one
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

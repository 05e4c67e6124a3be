//! Session path guard
//!
//! Every read/write keyed by a user-supplied session id resolves through
//! [`session_path`]. Ids are restricted to a safe charset so a hostile id can
//! never escape the store directory.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// Check a session id against the allowed charset.
///
/// Valid ids are non-empty, contain only `[A-Za-z0-9._-]`, no path
/// separators, and no `..` sequence.
pub fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.is_empty() {
        return Err(StoreError::InvalidSessionId(session_id.to_string()));
    }
    if session_id.contains("..") {
        return Err(StoreError::InvalidSessionId(session_id.to_string()));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(StoreError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

/// Resolve a session id to its artifact path under `base_dir`.
///
/// Returns `base_dir/<session_id>.json`, rejecting any id that fails
/// [`validate_session_id`].
pub fn session_path(base_dir: &Path, session_id: &str) -> Result<PathBuf, StoreError> {
    validate_session_id(session_id)?;
    let path = base_dir.join(format!("{session_id}.json"));
    debug!(%session_id, path = %path.display(), "session_path: resolved");
    Ok(path)
}

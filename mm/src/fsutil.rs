//! Small-file JSON persistence helpers
//!
//! Every user-scoped state file (lock, learned rules, blocklist, deferrals)
//! is a single JSON document replaced atomically via write-then-rename.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Atomically replace `path` with the pretty-printed JSON of `value`
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> eyre::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "write_json: replaced");
    Ok(())
}

/// Read a JSON file, returning the type's default when it does not exist
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> eyre::Result<T> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

//! Error types for the session store

use thiserror::Error;

/// Errors from session store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from disposition log operations
#[derive(Debug, Error)]
pub enum DispositionError {
    #[error("Unknown disposition action: {0:?}")]
    UnknownAction(String),

    #[error("Disposition itemId must be non-empty")]
    EmptyItemId,

    #[error("Action {action:?} requires field {field:?}")]
    MissingField { action: String, field: String },

    #[error("Batch disposition must contain at least one entry")]
    EmptyBatch,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from effort operations
#[derive(Debug, Error)]
pub enum EffortError {
    #[error("Effort name must be non-empty")]
    EmptyName,

    #[error("Effort must contain at least one item")]
    EmptyItems,

    #[error("Effort not found: {0}")]
    NotFound(String),

    #[error("Effort {id} is {status}, expected pending")]
    NotPending { id: String, status: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Disposition(#[from] DispositionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

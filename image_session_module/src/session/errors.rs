use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt session record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(
        "an image session is already active (started {started_at}, last activity {last_activity_at}, {iteration_count} edits)"
    )]
    SessionConflict {
        session_id: Uuid,
        started_at: DateTime<Utc>,
        last_activity_at: DateTime<Utc>,
        iteration_count: u32,
    },
    #[error("no active image session")]
    NoActiveSession,
    #[error("image generation failed: {0}")]
    GenerationFailed(String),
    #[error("edit result discarded: the session changed while the edit was running")]
    EditSuperseded,
    #[error("invalid image {path}: {reason}")]
    InvalidImage { path: PathBuf, reason: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

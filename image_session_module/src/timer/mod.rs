//! One-shot timers that drive reminders and cleanup.
//!
//! Sessions hold opaque [`TimerHandle`]s. A firing is only ever a hint: the
//! state machine re-checks the stored session before acting on it.

mod driver;
mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::session::{TimerHandle, TimerRole};

pub use driver::TimerDriver;
pub use memory::MemoryTimerService;
pub use sqlite::SqliteTimerService;

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("timer service unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A timer that reached its fire time and was removed from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTimer {
    pub handle: TimerHandle,
    pub role: TimerRole,
    pub scope: String,
    pub fire_at: DateTime<Utc>,
}

pub trait TimerService: Send + Sync {
    fn arm(&self, role: TimerRole, fire_at: DateTime<Utc>) -> Result<TimerHandle, TimerError>;

    /// Unknown or already-fired handles are ignored; backend errors are logged.
    fn cancel(&self, handle: &TimerHandle);

    /// Handles still pending in this service's scope.
    fn list(&self) -> Result<HashSet<TimerHandle>, TimerError>;
}

pub trait DueTimerSource: Send + Sync {
    /// Removes and returns every timer due at `now`, each exactly once.
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTimer>, TimerError>;
}

impl<T: TimerService + ?Sized> TimerService for Arc<T> {
    fn arm(&self, role: TimerRole, fire_at: DateTime<Utc>) -> Result<TimerHandle, TimerError> {
        (**self).arm(role, fire_at)
    }

    fn cancel(&self, handle: &TimerHandle) {
        (**self).cancel(handle)
    }

    fn list(&self) -> Result<HashSet<TimerHandle>, TimerError> {
        (**self).list()
    }
}

impl<T: DueTimerSource + ?Sized> DueTimerSource for Arc<T> {
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTimer>, TimerError> {
        (**self).take_due(now)
    }
}

pub(crate) fn sort_due(timers: &mut [DueTimer]) {
    timers.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.role.cmp(&b.role)));
}

#[cfg(test)]
mod tests;

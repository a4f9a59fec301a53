use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{sort_due, DueTimer, DueTimerSource, TimerError, TimerService};
use crate::session::{TimerHandle, TimerRole};

#[derive(Debug, Clone)]
struct PendingTimer {
    role: TimerRole,
    scope: String,
    fire_at: DateTime<Utc>,
}

/// Volatile timer backend. Clones share the same table; timers are lost when
/// the last clone is dropped, like a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryTimerService {
    scope: String,
    timers: Arc<Mutex<HashMap<TimerHandle, PendingTimer>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTimerService {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Same table, different scope.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            timers: self.timers.clone(),
            unavailable: self.unavailable.clone(),
        }
    }

    /// Pending timers in this scope, ordered by fire time.
    pub fn armed(&self) -> Vec<(TimerHandle, TimerRole, DateTime<Utc>)> {
        let timers = self.timers.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut armed = timers
            .iter()
            .filter(|(_, timer)| timer.scope == self.scope)
            .map(|(handle, timer)| (handle.clone(), timer.role, timer.fire_at))
            .collect::<Vec<_>>();
        armed.sort_by(|a, b| a.2.cmp(&b.2).then(a.1.cmp(&b.1)));
        armed
    }

    /// Makes `arm` and `list` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), TimerError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(TimerError::Unavailable("memory timer service offline".to_string()));
        }
        Ok(())
    }
}

impl TimerService for MemoryTimerService {
    fn arm(&self, role: TimerRole, fire_at: DateTime<Utc>) -> Result<TimerHandle, TimerError> {
        self.check_available()?;
        let handle = TimerHandle::new();
        let mut timers = self.timers.lock().unwrap_or_else(|poison| poison.into_inner());
        timers.insert(
            handle.clone(),
            PendingTimer {
                role,
                scope: self.scope.clone(),
                fire_at,
            },
        );
        Ok(handle)
    }

    fn cancel(&self, handle: &TimerHandle) {
        let mut timers = self.timers.lock().unwrap_or_else(|poison| poison.into_inner());
        timers.remove(handle);
    }

    fn list(&self) -> Result<HashSet<TimerHandle>, TimerError> {
        self.check_available()?;
        let timers = self.timers.lock().unwrap_or_else(|poison| poison.into_inner());
        Ok(timers
            .iter()
            .filter(|(_, timer)| timer.scope == self.scope)
            .map(|(handle, _)| handle.clone())
            .collect())
    }
}

impl DueTimerSource for MemoryTimerService {
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTimer>, TimerError> {
        let mut timers = self.timers.lock().unwrap_or_else(|poison| poison.into_inner());
        let due_handles = timers
            .iter()
            .filter(|(_, timer)| timer.fire_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect::<Vec<_>>();
        let mut due = due_handles
            .into_iter()
            .filter_map(|handle| {
                timers.remove(&handle).map(|timer| DueTimer {
                    handle,
                    role: timer.role,
                    scope: timer.scope,
                    fire_at: timer.fire_at,
                })
            })
            .collect::<Vec<_>>();
        sort_due(&mut due);
        Ok(due)
    }
}

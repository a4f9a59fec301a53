use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

use super::artifacts::sweep_session_artifacts;
use super::errors::SessionError;
use super::manager::SessionManager;
use super::types::{RecoveryReport, ReminderOutcome, TimerHandle, TimerRole};
use crate::delivery::Delivery;
use crate::timer::TimerService;

impl<T: TimerService, D: Delivery> SessionManager<T, D> {
    /// Repairs timers and files after a restart.
    pub fn recover(&self) -> Result<RecoveryReport, SessionError> {
        self.recover_at(Utc::now())
    }

    pub fn recover_at(&self, now: DateTime<Utc>) -> Result<RecoveryReport, SessionError> {
        let mut report = RecoveryReport::default();
        let workspace = self.store.workspace_dir().to_path_buf();
        let mut overdue = Vec::new();
        {
            let guard = self.store.lock()?;
            let live = match self.timers.list() {
                Ok(live) => live,
                Err(err) => {
                    warn!(
                        "timer list failed during recovery of {}: {}",
                        workspace.display(),
                        err
                    );
                    HashSet::new()
                }
            };

            let session = match guard.load()? {
                Some(session) if session.is_active() => session,
                Some(inactive) => {
                    report.cancelled_orphans = self.cancel_unreferenced(&live, &[]);
                    self.terminate(&guard, Some(inactive), false)?;
                    report.session_ended = true;
                    return Ok(report);
                }
                None => {
                    report.cancelled_orphans = self.cancel_unreferenced(&live, &[]);
                    report.swept_files = sweep_session_artifacts(&workspace, None);
                    if report.swept_files > 0 || report.cancelled_orphans > 0 {
                        info!(
                            "recovery of {} removed {} orphaned file(s) and {} timer(s)",
                            workspace.display(),
                            report.swept_files,
                            report.cancelled_orphans
                        );
                    }
                    return Ok(report);
                }
            };

            let mut session = session;
            let referenced = session
                .timer_handles
                .iter()
                .map(|(_, handle)| handle.clone())
                .collect::<Vec<_>>();
            report.cancelled_orphans = self.cancel_unreferenced(&live, &referenced);

            let mut changed = false;
            for role in TimerRole::ALL {
                if session
                    .timer_handles
                    .get(role)
                    .is_some_and(|handle| live.contains(handle))
                {
                    continue;
                }
                let target = session.fire_at(role, &self.timings);
                if target > now {
                    match self.timers.arm(role, target) {
                        Ok(handle) => {
                            session.timer_handles.set(role, Some(handle));
                            report.rearmed.push(role);
                            changed = true;
                        }
                        Err(err) => warn!(
                            "failed to rearm {} timer for session {}: {}",
                            role, session.id, err
                        ),
                    }
                } else if !session.delivered_reminders.contains(&role) {
                    overdue.push(role);
                }
            }
            if changed {
                guard.save(&session)?;
            }
            info!(
                "recovered session {}: rearmed {:?}, overdue {:?}",
                session.id, report.rearmed, overdue
            );
        }

        for role in overdue {
            let outcome = self.on_reminder_at(role, now)?;
            report.fired.push((role, outcome));
            if outcome == ReminderOutcome::CleanedUp {
                report.session_ended = true;
                break;
            }
        }
        Ok(report)
    }

    fn cancel_unreferenced(&self, live: &HashSet<TimerHandle>, referenced: &[TimerHandle]) -> usize {
        let mut cancelled = 0;
        for handle in live {
            if !referenced.contains(handle) {
                self.timers.cancel(handle);
                cancelled += 1;
            }
        }
        cancelled
    }
}

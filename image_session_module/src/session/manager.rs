use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::artifacts::{
    adopt_output, import_image, is_pending_output, pending_dir, remove_file_best_effort,
    sweep_session_artifacts, ORIGINAL_STEM, REFERENCE_STEM,
};
use super::errors::SessionError;
use super::messages::{
    edit_failed_message, edit_result_message, edit_superseded_message, final_image_message,
    reminder_message,
};
use super::store::{SessionGuard, SessionStore};
use super::types::{
    EditOutcome, EditRequest, ReminderOutcome, Session, SessionMode, SessionTimings, TimerRole,
};
use crate::delivery::Delivery;
use crate::generator::ImageGenerator;
use crate::timer::{DueTimer, TimerService};

const RESTART_STAGE_STEM: &str = ".restart-source";

/// Drives the lifecycle of the single session in one workspace.
pub struct SessionManager<T: TimerService, D: Delivery> {
    pub(super) store: SessionStore,
    pub(super) timers: T,
    delivery: D,
    pub(super) timings: SessionTimings,
}

impl<T: TimerService, D: Delivery> SessionManager<T, D> {
    pub fn new(workspace_dir: impl Into<PathBuf>, timers: T, delivery: D) -> Self {
        Self {
            store: SessionStore::new(workspace_dir),
            timers,
            delivery,
            timings: SessionTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn workspace_dir(&self) -> &Path {
        self.store.workspace_dir()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    pub fn status(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.store.load()?.filter(Session::is_active))
    }

    pub fn start_session(&self, source_image: &Path) -> Result<Session, SessionError> {
        let guard = self.store.lock()?;
        self.start_locked(&guard, source_image)
    }

    fn start_locked(
        &self,
        guard: &SessionGuard<'_>,
        source_image: &Path,
    ) -> Result<Session, SessionError> {
        if let Some(existing) = guard.load()? {
            if existing.is_active() {
                return Err(SessionError::SessionConflict {
                    session_id: existing.id,
                    started_at: existing.created_at,
                    last_activity_at: existing.last_activity_at,
                    iteration_count: existing.iteration_count,
                });
            }
            self.cancel_timers(&existing);
        }
        ensure_image(source_image)?;

        let workspace = self.store.workspace_dir();
        let original = import_image(source_image, workspace, ORIGINAL_STEM)?;
        let swept = sweep_session_artifacts(workspace, Some(&original));
        if swept > 0 {
            info!(
                "removed {} leftover artifact(s) from {}",
                swept,
                workspace.display()
            );
        }

        let mut session = Session::new(original, Utc::now());
        self.rearm_timers(&mut session);
        guard.save(&session)?;
        info!(
            "started image session {} in {} from {}",
            session.id,
            workspace.display(),
            source_image.display()
        );
        Ok(session)
    }

    /// Ends any active session without a final delivery, then starts afresh.
    /// Both steps run under one workspace lock.
    pub fn restart_session(&self, source_image: &Path) -> Result<Session, SessionError> {
        ensure_image(source_image)?;
        let staged = self.stage_if_in_workspace(source_image)?;
        let source = staged.as_deref().unwrap_or(source_image);
        let result = self.replace_session(source);
        if let Some(staged) = staged.as_deref() {
            remove_file_best_effort(staged);
        }
        result
    }

    fn replace_session(&self, source: &Path) -> Result<Session, SessionError> {
        let guard = self.store.lock()?;
        if let Some(previous) = guard.load()? {
            self.terminate(&guard, Some(previous), false)?;
        }
        self.start_locked(&guard, source)
    }

    fn stage_if_in_workspace(&self, source: &Path) -> Result<Option<PathBuf>, SessionError> {
        let workspace = fs::canonicalize(self.store.workspace_dir()).ok();
        let source_canonical = fs::canonicalize(source)?;
        match workspace {
            Some(workspace) if source_canonical.starts_with(&workspace) => {
                let staged = import_image(source, &workspace, RESTART_STAGE_STEM)?;
                Ok(Some(staged))
            }
            _ => Ok(None),
        }
    }

    pub fn add_reference(&self, reference_image: &Path) -> Result<Session, SessionError> {
        let guard = self.store.lock()?;
        let mut session = load_active(&guard)?;
        ensure_image(reference_image)?;
        let reference = import_image(reference_image, self.store.workspace_dir(), REFERENCE_STEM)?;
        session.reference_image_path = Some(reference);
        session.mode = SessionMode::ReferenceGuided;
        session.touch(Utc::now());
        self.rearm_timers(&mut session);
        guard.save(&session)?;
        info!(
            "session {} switched to {} mode",
            session.id,
            session.mode.as_str()
        );
        Ok(session)
    }

    /// Runs one edit. The generator is called without the workspace lock held.
    pub fn apply_edit<G>(&self, prompt: &str, generator: &G) -> Result<EditOutcome, SessionError>
    where
        G: ImageGenerator + ?Sized,
    {
        let (snapshot, edit_inputs) = {
            let guard = self.store.lock()?;
            let session = load_active(&guard)?;
            let edit_inputs = session.edit_inputs();
            (session, edit_inputs)
        };
        let workspace = self.store.workspace_dir();
        let output_dir = pending_dir(workspace);
        fs::create_dir_all(&output_dir)?;

        info!(
            "session {} dispatching edit {} ({}, {} input(s))",
            snapshot.id,
            snapshot.iteration_count + 1,
            edit_inputs.mode.as_str(),
            edit_inputs.inputs.len()
        );
        let output = match generator.generate(
            &edit_inputs.inputs,
            prompt,
            edit_inputs.mode,
            &output_dir,
        ) {
            Ok(output) => output,
            Err(failure) => {
                warn!("session {} edit failed: {}", snapshot.id, failure);
                self.deliver(&edit_failed_message(&failure.0), None);
                return Err(SessionError::GenerationFailed(failure.0));
            }
        };

        match self.commit_edit(&snapshot, &output) {
            Ok(session) => {
                let current = session
                    .current_image_path
                    .clone()
                    .unwrap_or_else(|| output.clone());
                self.deliver(
                    &edit_result_message(session.iteration_count, session.mode),
                    Some(&current),
                );
                Ok(EditOutcome {
                    output_path: current,
                    inputs: edit_inputs.inputs,
                    mode: edit_inputs.mode,
                    session,
                })
            }
            Err(SessionError::EditSuperseded) => {
                if is_pending_output(&output, workspace) {
                    remove_file_best_effort(&output);
                }
                warn!("session {} edit result discarded", snapshot.id);
                self.deliver(&edit_superseded_message(), None);
                Err(SessionError::EditSuperseded)
            }
            Err(err) => {
                error!("session {} failed to commit edit: {}", snapshot.id, err);
                self.deliver(&edit_failed_message(&err.to_string()), None);
                Err(err)
            }
        }
    }

    fn commit_edit(&self, snapshot: &Session, output: &Path) -> Result<Session, SessionError> {
        let guard = self.store.lock()?;
        let mut session = match guard.load()? {
            Some(session)
                if session.is_active()
                    && session.id == snapshot.id
                    && session.iteration_count == snapshot.iteration_count =>
            {
                session
            }
            _ => return Err(SessionError::EditSuperseded),
        };
        if !output.is_file() {
            return Err(SessionError::GenerationFailed(format!(
                "generator output {} does not exist",
                output.display()
            )));
        }
        let current = adopt_output(output, self.store.workspace_dir())?;
        session.current_image_path = Some(current);
        session.iteration_count += 1;
        session.touch(Utc::now());
        self.rearm_timers(&mut session);
        guard.save(&session)?;
        info!(
            "session {} committed edit {}",
            session.id, session.iteration_count
        );
        Ok(session)
    }

    /// Applies an optional new reference, then the edit.
    pub fn submit<G>(&self, request: &EditRequest, generator: &G) -> Result<EditOutcome, SessionError>
    where
        G: ImageGenerator + ?Sized,
    {
        if let Some(reference) = request.reference.as_deref() {
            self.add_reference(reference)?;
        }
        self.apply_edit(&request.prompt, generator)
    }

    /// Ends the session. Safe to call when no session exists.
    pub fn complete(&self, satisfied: bool) -> Result<Option<Session>, SessionError> {
        let guard = self.store.lock()?;
        let session = guard.load()?;
        self.terminate(&guard, session, satisfied)
    }

    pub(super) fn terminate(
        &self,
        guard: &SessionGuard<'_>,
        session: Option<Session>,
        satisfied: bool,
    ) -> Result<Option<Session>, SessionError> {
        let workspace = self.store.workspace_dir();
        if let Some(session) = session.as_ref() {
            if satisfied && session.is_active() {
                if let Some(current) = session.current_image_path.as_deref() {
                    self.deliver(&final_image_message(session.iteration_count), Some(current));
                }
            }
            self.cancel_timers(session);
            remove_file_best_effort(&session.original_image_path);
            for path in [
                session.reference_image_path.as_deref(),
                session.current_image_path.as_deref(),
            ]
            .into_iter()
            .flatten()
            {
                remove_file_best_effort(path);
            }
        }
        let swept = sweep_session_artifacts(workspace, None);
        guard.clear()?;
        match session.as_ref() {
            Some(session) => info!(
                "closed image session {} in {} after {} edit(s) (satisfied: {})",
                session.id,
                workspace.display(),
                session.iteration_count,
                satisfied
            ),
            None if swept > 0 => info!(
                "removed {} orphaned artifact(s) from {}",
                swept,
                workspace.display()
            ),
            None => {}
        }
        Ok(session)
    }

    pub fn on_reminder(&self, role: TimerRole) -> Result<ReminderOutcome, SessionError> {
        self.on_reminder_at(role, Utc::now())
    }

    pub fn on_reminder_at(
        &self,
        role: TimerRole,
        now: DateTime<Utc>,
    ) -> Result<ReminderOutcome, SessionError> {
        let guard = self.store.lock()?;
        let mut session = match guard.load()? {
            Some(session) if session.is_active() => session,
            Some(inactive) => {
                self.terminate(&guard, Some(inactive), false)?;
                return Ok(ReminderOutcome::Ignored);
            }
            None => return Ok(ReminderOutcome::Ignored),
        };

        if role == TimerRole::Cleanup24h || session.is_stale(now, &self.timings) {
            if role != TimerRole::Cleanup24h {
                info!(
                    "session {} is past its cleanup deadline; {} becomes cleanup",
                    session.id, role
                );
            }
            let satisfied = session.current_image_path.is_some();
            self.terminate(&guard, Some(session), satisfied)?;
            return Ok(ReminderOutcome::CleanedUp);
        }

        if session.delivered_reminders.contains(&role) {
            return Ok(ReminderOutcome::Ignored);
        }
        // The handle stays in the record until the next rearm.
        if let Some(handle) = session.timer_handles.get(role) {
            self.timers.cancel(handle);
        }
        session.delivered_reminders.insert(role);
        guard.save(&session)?;
        drop(guard);

        info!("session {} sending {} reminder", session.id, role);
        self.deliver(&reminder_message(role), None);
        Ok(ReminderOutcome::Reminded)
    }

    /// Entry point for the timer driver. Firings of handles the session no
    /// longer references are ignored.
    pub fn on_timer_fired(&self, due: &DueTimer) -> Result<ReminderOutcome, SessionError> {
        {
            let guard = self.store.lock()?;
            let current = guard
                .load()?
                .and_then(|session| session.timer_handles.get(due.role).cloned());
            if current.as_ref() != Some(&due.handle) {
                info!("ignoring stale {} timer {}", due.role, due.handle);
                return Ok(ReminderOutcome::Ignored);
            }
        }
        self.on_reminder_at(due.role, Utc::now())
    }

    /// Cancels every timer of the session and arms all three from its last activity.
    pub(super) fn rearm_timers(&self, session: &mut Session) {
        for (_, handle) in session.timer_handles.take_all() {
            self.timers.cancel(&handle);
        }
        session.delivered_reminders.clear();
        for role in TimerRole::ALL {
            let fire_at = session.fire_at(role, &self.timings);
            match self.timers.arm(role, fire_at) {
                Ok(handle) => session.timer_handles.set(role, Some(handle)),
                Err(err) => warn!(
                    "failed to arm {} timer for session {}: {}",
                    role, session.id, err
                ),
            }
        }
    }

    pub(super) fn cancel_timers(&self, session: &Session) {
        for (_, handle) in session.timer_handles.iter() {
            self.timers.cancel(handle);
        }
    }

    fn deliver(&self, message: &str, image: Option<&Path>) {
        if let Err(err) = self.delivery.send(message, image) {
            warn!(
                "delivery failed for {}: {}",
                self.store.workspace_dir().display(),
                err
            );
        }
    }
}

fn load_active(guard: &SessionGuard<'_>) -> Result<Session, SessionError> {
    guard
        .load()?
        .filter(Session::is_active)
        .ok_or(SessionError::NoActiveSession)
}

fn ensure_image(path: &Path) -> Result<(), SessionError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(SessionError::InvalidImage {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        }),
        Err(err) => Err(SessionError::InvalidImage {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

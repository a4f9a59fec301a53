use chrono::{Duration, Utc};
use image_session_module::{
    Delivery, DeliveryError, DueTimerSource, GenerateFailure, ReminderOutcome, SessionError,
    SessionManager, SessionMode, SqliteTimerService, TimerRole, TimerService,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Outbox {
    messages: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl Outbox {
    fn messages(&self) -> Vec<(String, Option<String>)> {
        self.messages.lock().expect("outbox").clone()
    }
}

impl Delivery for Outbox {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError> {
        let contents = image.map(|path| fs::read_to_string(path).expect("delivered image"));
        self.messages
            .lock()
            .expect("outbox")
            .push((message.to_string(), contents));
        Ok(())
    }
}

fn echo_generator(
    inputs: &[PathBuf],
    prompt: &str,
    _mode: SessionMode,
    output_dir: &Path,
) -> Result<PathBuf, GenerateFailure> {
    let mut parts = Vec::new();
    for input in inputs {
        parts.push(fs::read_to_string(input).map_err(|err| GenerateFailure(err.to_string()))?);
    }
    let output = output_dir.join("result.png");
    fs::write(&output, format!("{}<{}>", prompt, parts.join("+")))
        .map_err(|err| GenerateFailure(err.to_string()))?;
    Ok(output)
}

fn manager(
    workspace: &Path,
    timers: &SqliteTimerService,
    outbox: &Outbox,
) -> SessionManager<SqliteTimerService, Outbox> {
    SessionManager::new(workspace, timers.clone(), outbox.clone())
}

#[test]
fn edits_chain_through_a_durable_timer_store() {
    let temp = TempDir::new().expect("tempdir");
    let workspace = temp.path().join("chat_1");
    let timers = SqliteTimerService::new(temp.path().join("timers.db"), "chat_1").expect("timers");
    let outbox = Outbox::default();
    let source = temp.path().join("a.png");
    let reference = temp.path().join("b.jpg");
    fs::write(&source, "a").expect("source");
    fs::write(&reference, "b").expect("reference");

    let sessions = manager(&workspace, &timers, &outbox);
    sessions.start_session(&source).expect("start");
    sessions
        .apply_edit("cutout", &echo_generator)
        .expect("first edit");
    sessions.add_reference(&reference).expect("reference");
    let second = sessions
        .apply_edit("style", &echo_generator)
        .expect("second edit");

    assert_eq!(second.session.iteration_count, 2);
    assert_eq!(
        fs::read_to_string(&second.output_path).expect("current"),
        "style<cutout<a>+b>"
    );
    assert_eq!(timers.list().expect("list").len(), 3);

    sessions.complete(true).expect("complete");

    let messages = outbox.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].1.as_deref(), Some("style<cutout<a>+b>"));
    assert!(timers.list().expect("list").is_empty());
    assert!(sessions.status().expect("status").is_none());
}

#[test]
fn durable_timers_drive_reminders_after_a_restart() {
    let temp = TempDir::new().expect("tempdir");
    let workspace = temp.path().join("chat_2");
    let db = temp.path().join("timers.db");
    let outbox = Outbox::default();
    let source = temp.path().join("a.png");
    fs::write(&source, "a").expect("source");

    let started = {
        let timers = SqliteTimerService::new(&db, "chat_2").expect("timers");
        manager(&workspace, &timers, &outbox)
            .start_session(&source)
            .expect("start")
    };

    let timers = SqliteTimerService::new(&db, "chat_2").expect("reopen");
    let sessions = manager(&workspace, &timers, &outbox);
    let report = sessions.recover().expect("recover");
    assert!(report.rearmed.is_empty());
    assert!(report.fired.is_empty());

    let due = timers
        .take_due(started.last_activity_at + Duration::hours(2) + Duration::seconds(1))
        .expect("take due");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].role, TimerRole::Reminder2h);
    assert_eq!(
        sessions.on_timer_fired(&due[0]).expect("fire"),
        ReminderOutcome::Reminded
    );
    assert_eq!(outbox.messages().len(), 1);

    let due = timers
        .take_due(started.last_activity_at + Duration::hours(25))
        .expect("take due");
    let roles = due.iter().map(|timer| timer.role).collect::<Vec<_>>();
    assert_eq!(roles, vec![TimerRole::Reminder6h, TimerRole::Cleanup24h]);
    for timer in &due {
        sessions.on_timer_fired(timer).expect("fire");
    }
    assert_eq!(outbox.messages().len(), 2);
    assert!(sessions.status().expect("status").is_none());
}

#[test]
fn second_start_in_the_same_workspace_conflicts() {
    let temp = TempDir::new().expect("tempdir");
    let workspace = temp.path().join("chat_3");
    let timers = SqliteTimerService::new(temp.path().join("timers.db"), "chat_3").expect("timers");
    let outbox = Outbox::default();
    let source = temp.path().join("a.png");
    fs::write(&source, "a").expect("source");
    let sessions = manager(&workspace, &timers, &outbox);
    sessions.start_session(&source).expect("start");

    let err = sessions.start_session(&source).expect_err("conflict");
    assert!(matches!(err, SessionError::SessionConflict { .. }));

    let restarted = sessions.restart_session(&source).expect("restart");
    assert_eq!(restarted.iteration_count, 0);
    assert_eq!(timers.list().expect("list").len(), 3);
}

#[test]
fn stale_session_is_cleaned_on_recovery_even_with_old_timers_lost() {
    let temp = TempDir::new().expect("tempdir");
    let workspace = temp.path().join("chat_4");
    let outbox = Outbox::default();
    let source = temp.path().join("a.png");
    fs::write(&source, "a").expect("source");
    {
        let timers =
            SqliteTimerService::new(temp.path().join("old.db"), "chat_4").expect("timers");
        let sessions = manager(&workspace, &timers, &outbox);
        sessions.start_session(&source).expect("start");
        let guard = sessions.store().lock().expect("lock");
        let mut session = guard.load().expect("load").expect("session");
        session.created_at = Utc::now() - Duration::hours(30);
        session.last_activity_at = session.created_at;
        guard.save(&session).expect("save");
    }

    let timers = SqliteTimerService::new(temp.path().join("new.db"), "chat_4").expect("timers");
    let sessions = manager(&workspace, &timers, &outbox);
    let report = sessions.recover().expect("recover");

    assert!(report.session_ended);
    assert!(outbox.messages().is_empty());
    assert!(!workspace.join("original.png").exists());
    assert!(!workspace.join("session.json").exists());
}

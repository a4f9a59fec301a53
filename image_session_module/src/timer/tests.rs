use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

use super::{DueTimerSource, MemoryTimerService, SqliteTimerService, TimerDriver, TimerService};
use crate::session::{TimerHandle, TimerRole};

#[test]
fn memory_timers_fire_once_in_time_then_role_order() {
    let timers = MemoryTimerService::new("ws");
    let now = Utc::now();
    let late = timers
        .arm(TimerRole::Cleanup24h, now - Duration::minutes(1))
        .expect("arm");
    let early = timers
        .arm(TimerRole::Reminder6h, now - Duration::minutes(5))
        .expect("arm");
    let tied = timers
        .arm(TimerRole::Reminder2h, now - Duration::minutes(5))
        .expect("arm");
    timers
        .arm(TimerRole::Reminder2h, now + Duration::hours(1))
        .expect("arm future");

    let due = timers.take_due(now).expect("take due");

    let handles = due.iter().map(|timer| timer.handle.clone()).collect::<Vec<_>>();
    assert_eq!(handles, vec![tied, early, late]);
    assert!(due.iter().all(|timer| timer.scope == "ws"));
    assert!(timers.take_due(now).expect("again").is_empty());
    assert_eq!(timers.list().expect("list").len(), 1);
}

#[test]
fn memory_cancel_of_unknown_handle_is_a_noop() {
    let timers = MemoryTimerService::new("ws");
    let handle = timers
        .arm(TimerRole::Reminder2h, Utc::now() + Duration::hours(2))
        .expect("arm");

    timers.cancel(&TimerHandle::from("never-armed".to_string()));
    timers.cancel(&handle);
    timers.cancel(&handle);

    assert!(timers.list().expect("list").is_empty());
}

#[test]
fn memory_list_is_scoped_but_take_due_sees_every_scope() {
    let first = MemoryTimerService::new("first");
    let second = first.scoped("second");
    let past = Utc::now() - Duration::seconds(1);
    first.arm(TimerRole::Reminder2h, past).expect("arm first");
    second.arm(TimerRole::Reminder6h, past).expect("arm second");

    assert_eq!(first.list().expect("list").len(), 1);
    assert_eq!(second.list().expect("list").len(), 1);
    let due = first.take_due(Utc::now()).expect("take due");
    assert_eq!(due.len(), 2);
    assert!(second.list().expect("list").is_empty());
}

#[test]
fn unavailable_memory_service_refuses_to_arm() {
    let timers = MemoryTimerService::new("ws");
    timers.set_unavailable(true);

    assert!(timers.arm(TimerRole::Reminder2h, Utc::now()).is_err());
    assert!(timers.list().is_err());
}

#[test]
fn sqlite_timers_survive_reopening() {
    let temp = TempDir::new().expect("tempdir");
    let db_path = temp.path().join("state").join("timers.db");
    let fire_at = Utc::now() + Duration::hours(6);
    let handle = {
        let timers = SqliteTimerService::new(&db_path, "ws").expect("open");
        timers.arm(TimerRole::Reminder6h, fire_at).expect("arm")
    };

    let reopened = SqliteTimerService::new(&db_path, "ws").expect("reopen");

    assert!(reopened.list().expect("list").contains(&handle));
    assert!(reopened.take_due(Utc::now()).expect("not due").is_empty());
    let due = reopened
        .take_due(fire_at + Duration::seconds(1))
        .expect("due");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].handle, handle);
    assert_eq!(due[0].role, TimerRole::Reminder6h);
    assert_eq!(due[0].scope, "ws");
    assert_eq!(
        due[0].fire_at.timestamp_millis(),
        fire_at.timestamp_millis()
    );
    assert!(reopened.list().expect("list").is_empty());
}

#[test]
fn sqlite_scopes_are_isolated_for_list_and_cancel() {
    let temp = TempDir::new().expect("tempdir");
    let db_path = temp.path().join("timers.db");
    let first = SqliteTimerService::new(&db_path, "first").expect("open");
    let second = first.scoped("second");
    let soon = Utc::now() + Duration::minutes(10);
    let kept = first.arm(TimerRole::Reminder2h, soon).expect("arm");
    let cancelled = second.arm(TimerRole::Cleanup24h, soon).expect("arm");

    second.cancel(&cancelled);
    second.cancel(&cancelled);

    assert_eq!(first.list().expect("list").into_iter().collect::<Vec<_>>(), vec![kept]);
    assert!(second.list().expect("list").is_empty());
}

#[test]
fn driver_dispatches_due_timers_until_stopped() {
    let timers = MemoryTimerService::new("ws");
    let handle = timers
        .arm(TimerRole::Reminder2h, Utc::now() - Duration::seconds(1))
        .expect("arm");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let mut driver = TimerDriver::start(timers.clone(), StdDuration::from_millis(20), move |due| {
        sink.lock().expect("sink").push(due.handle);
    });
    let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
    while seen.lock().expect("seen").is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(StdDuration::from_millis(10));
    }
    driver.stop_and_join();

    assert_eq!(*seen.lock().expect("seen"), vec![handle]);
    assert!(timers.list().expect("list").is_empty());
}

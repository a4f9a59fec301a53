use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use super::{sort_due, DueTimer, DueTimerSource, TimerError, TimerService};
use crate::session::{TimerHandle, TimerRole};

const TIMER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS timers (
    id TEXT PRIMARY KEY,
    scope TEXT NOT NULL,
    role TEXT NOT NULL,
    fire_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS timers_fire_at_idx ON timers (fire_at);
CREATE INDEX IF NOT EXISTS timers_scope_idx ON timers (scope);
"#;

/// Durable one-shot timers in a SQLite table, shared by every workspace and
/// separated by scope.
#[derive(Debug, Clone)]
pub struct SqliteTimerService {
    path: PathBuf,
    scope: String,
}

fn format_datetime(value: DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order in SQL comparisons.
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, TimerError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

impl SqliteTimerService {
    pub fn new(path: impl Into<PathBuf>, scope: impl Into<String>) -> Result<Self, TimerError> {
        let service = Self {
            path: path.into(),
            scope: scope.into(),
        };
        service.open()?;
        Ok(service)
    }

    /// Same database, different scope.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            scope: scope.into(),
        }
    }

    fn open(&self) -> Result<Connection, TimerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(TIMER_SCHEMA)?;
        Ok(conn)
    }
}

impl TimerService for SqliteTimerService {
    fn arm(&self, role: TimerRole, fire_at: DateTime<Utc>) -> Result<TimerHandle, TimerError> {
        let conn = self
            .open()
            .map_err(|err| TimerError::Unavailable(err.to_string()))?;
        let handle = TimerHandle::new();
        conn.execute(
            "INSERT INTO timers (id, scope, role, fire_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                handle.as_str(),
                self.scope,
                role.as_str(),
                format_datetime(fire_at),
                format_datetime(Utc::now()),
            ],
        )?;
        Ok(handle)
    }

    fn cancel(&self, handle: &TimerHandle) {
        let result = self.open().and_then(|conn| {
            conn.execute("DELETE FROM timers WHERE id = ?1", params![handle.as_str()])?;
            Ok(())
        });
        if let Err(err) = result {
            warn!("failed to cancel timer {}: {}", handle, err);
        }
    }

    fn list(&self) -> Result<HashSet<TimerHandle>, TimerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT id FROM timers WHERE scope = ?1")?;
        let rows = stmt.query_map(params![self.scope], |row| row.get::<_, String>(0))?;
        let mut handles = HashSet::new();
        for row in rows {
            handles.insert(TimerHandle::from(row?));
        }
        Ok(handles)
    }
}

impl DueTimerSource for SqliteTimerService {
    /// Claims due timers across every scope in one transaction.
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTimer>, TimerError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let rows = {
            let mut stmt =
                tx.prepare("SELECT id, scope, role, fire_at FROM timers WHERE fire_at <= ?1")?;
            let rows = stmt.query_map(params![format_datetime(now)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut due = Vec::with_capacity(rows.len());
        for (id, scope, role, fire_at) in rows {
            tx.execute("DELETE FROM timers WHERE id = ?1", params![id])?;
            let role = match role.parse::<TimerRole>() {
                Ok(role) => role,
                Err(err) => {
                    warn!("dropping timer {} with unreadable role: {}", id, err);
                    continue;
                }
            };
            due.push(DueTimer {
                handle: TimerHandle::from(id),
                role,
                scope,
                fire_at: parse_datetime(&fire_at)?,
            });
        }
        tx.commit()?;
        sort_due(&mut due);
        Ok(due)
    }
}

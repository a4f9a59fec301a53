use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::errors::StoreError;
use super::types::Session;

const RECORD_FILE: &str = "session.json";
const LOCK_FILE: &str = "session.lock";
const TEMP_FILE: &str = ".session.json.tmp";

/// Persists the single session record of one workspace.
#[derive(Debug, Clone)]
pub struct SessionStore {
    workspace_dir: PathBuf,
}

impl SessionStore {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.workspace_dir.join(RECORD_FILE)
    }

    /// Takes the exclusive workspace lock. Blocks until it is available.
    pub fn lock(&self) -> Result<SessionGuard<'_>, StoreError> {
        fs::create_dir_all(&self.workspace_dir)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.workspace_dir.join(LOCK_FILE))?;
        lock_file.lock_exclusive()?;
        Ok(SessionGuard {
            store: self,
            lock_file,
        })
    }

    /// Read-only snapshot of the record.
    pub fn load(&self) -> Result<Option<Session>, StoreError> {
        let guard = self.lock()?;
        guard.load()
    }
}

/// Holds the workspace lock; every read-modify-write goes through one guard.
pub struct SessionGuard<'a> {
    store: &'a SessionStore,
    lock_file: File,
}

impl SessionGuard<'_> {
    pub fn load(&self) -> Result<Option<Session>, StoreError> {
        let path = self.store.record_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return self.quarantine(&path, err.to_string()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => return self.quarantine(&path, err.to_string()),
        };
        if let Err(reason) = session.validate() {
            return self.quarantine(&path, reason);
        }
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let dir = self.store.workspace_dir();
        fs::create_dir_all(dir)?;
        let temp_path = dir.join(TEMP_FILE);
        let payload = serde_json::to_string_pretty(session)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(payload.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.store.record_path())?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.store.record_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn quarantine(&self, path: &Path, reason: String) -> Result<Option<Session>, StoreError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = path.with_file_name(format!("{}.corrupt-{}", RECORD_FILE, stamp));
        match fs::rename(path, &target) {
            Ok(()) => {
                warn!(
                    "session record {} is corrupt ({}); moved to {}",
                    path.display(),
                    reason,
                    target.display()
                );
                Ok(None)
            }
            Err(err) => {
                warn!(
                    "failed to move corrupt session record {}: {}",
                    path.display(),
                    err
                );
                Err(StoreError::Corrupt {
                    path: path.to_path_buf(),
                    reason,
                })
            }
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

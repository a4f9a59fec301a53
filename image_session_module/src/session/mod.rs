mod artifacts;
mod errors;
mod manager;
mod messages;
mod recovery;
mod store;
mod types;

pub use artifacts::{import_image, remove_file_best_effort, sweep_session_artifacts};
pub use errors::{SessionError, StoreError};
pub use manager::SessionManager;
pub use store::{SessionGuard, SessionStore};
pub use types::{
    EditInputs, EditOutcome, EditRequest, RecoveryReport, ReminderOutcome, Session, SessionMode,
    SessionStatus, SessionTimings, TimerHandle, TimerHandles, TimerRole,
};

//! Image editing session lifecycle: one session per chat workspace, with
//! reminder and cleanup timers that survive restarts.

pub mod config;
pub mod delivery;
pub mod generator;
pub mod inbound;
pub mod session;
pub mod timer;
pub mod workspace;

pub use config::{DeliveryKind, SessionConfig};
pub use delivery::{Delivery, DeliveryError, StdoutDelivery, TelegramDelivery};
pub use generator::{CommandImageGenerator, GenerateFailure, ImageGenerator};
pub use session::{
    EditOutcome, EditRequest, RecoveryReport, ReminderOutcome, Session, SessionError,
    SessionManager, SessionMode, SessionStatus, SessionStore, SessionTimings, TimerHandle,
    TimerRole,
};
pub use timer::{
    DueTimer, DueTimerSource, MemoryTimerService, SqliteTimerService, TimerDriver, TimerError,
    TimerService,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    PromptOnly,
    ReferenceGuided,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::PromptOnly => "prompt-only",
            SessionMode::ReferenceGuided => "reference-guided",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three timed callbacks every active session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerRole {
    #[serde(rename = "reminder2h")]
    Reminder2h,
    #[serde(rename = "reminder6h")]
    Reminder6h,
    #[serde(rename = "cleanup24h")]
    Cleanup24h,
}

impl TimerRole {
    /// Firing order used by recovery.
    pub const ALL: [TimerRole; 3] = [
        TimerRole::Reminder2h,
        TimerRole::Reminder6h,
        TimerRole::Cleanup24h,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerRole::Reminder2h => "reminder2h",
            TimerRole::Reminder6h => "reminder6h",
            TimerRole::Cleanup24h => "cleanup24h",
        }
    }

    pub fn is_reminder(&self) -> bool {
        !matches!(self, TimerRole::Cleanup24h)
    }
}

impl fmt::Display for TimerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reminder2h" => Ok(TimerRole::Reminder2h),
            "reminder6h" => Ok(TimerRole::Reminder6h),
            "cleanup24h" => Ok(TimerRole::Cleanup24h),
            other => Err(format!("unknown timer role: {}", other)),
        }
    }
}

/// Opaque identifier issued by the timer service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerHandle(String);

impl TimerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TimerHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerHandles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder2h: Option<TimerHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder6h: Option<TimerHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup24h: Option<TimerHandle>,
}

impl TimerHandles {
    pub fn get(&self, role: TimerRole) -> Option<&TimerHandle> {
        match role {
            TimerRole::Reminder2h => self.reminder2h.as_ref(),
            TimerRole::Reminder6h => self.reminder6h.as_ref(),
            TimerRole::Cleanup24h => self.cleanup24h.as_ref(),
        }
    }

    pub fn set(&mut self, role: TimerRole, handle: Option<TimerHandle>) {
        match role {
            TimerRole::Reminder2h => self.reminder2h = handle,
            TimerRole::Reminder6h => self.reminder6h = handle,
            TimerRole::Cleanup24h => self.cleanup24h = handle,
        }
    }

    /// Removes and returns every present handle.
    pub fn take_all(&mut self) -> Vec<(TimerRole, TimerHandle)> {
        TimerRole::ALL
            .iter()
            .filter_map(|role| {
                let slot = match role {
                    TimerRole::Reminder2h => &mut self.reminder2h,
                    TimerRole::Reminder6h => &mut self.reminder6h,
                    TimerRole::Cleanup24h => &mut self.cleanup24h,
                };
                slot.take().map(|handle| (*role, handle))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimerRole, &TimerHandle)> + '_ {
        TimerRole::ALL
            .iter()
            .filter_map(move |role| self.get(*role).map(|handle| (*role, handle)))
    }

    pub fn all_present(&self) -> bool {
        TimerRole::ALL.iter().all(|role| self.get(*role).is_some())
    }

    pub fn all_absent(&self) -> bool {
        TimerRole::ALL.iter().all(|role| self.get(*role).is_none())
    }
}

/// Offsets from the last activity at which each timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub reminder_first: Duration,
    pub reminder_second: Duration,
    pub cleanup: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            reminder_first: Duration::hours(2),
            reminder_second: Duration::hours(6),
            cleanup: Duration::hours(24),
        }
    }
}

impl SessionTimings {
    pub fn offset(&self, role: TimerRole) -> Duration {
        match role {
            TimerRole::Reminder2h => self.reminder_first,
            TimerRole::Reminder6h => self.reminder_second,
            TimerRole::Cleanup24h => self.cleanup,
        }
    }

    /// Offsets must be positive and strictly increasing in role order.
    pub fn is_valid(&self) -> bool {
        self.reminder_first > Duration::zero()
            && self.reminder_first < self.reminder_second
            && self.reminder_second < self.cleanup
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub original_image_path: PathBuf,
    #[serde(default)]
    pub reference_image_path: Option<PathBuf>,
    #[serde(default)]
    pub current_image_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub iteration_count: u32,
    #[serde(default)]
    pub timer_handles: TimerHandles,
    /// Reminders already sent since the last activity; cleared on every rearm.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delivered_reminders: BTreeSet<TimerRole>,
}

impl Session {
    pub fn new(original_image_path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            mode: SessionMode::PromptOnly,
            original_image_path,
            reference_image_path: None,
            current_image_path: None,
            created_at: now,
            last_activity_at: now,
            iteration_count: 0,
            timer_handles: TimerHandles::default(),
            delivered_reminders: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// The image the next edit starts from.
    pub fn effective_input(&self) -> &Path {
        match (self.iteration_count, self.current_image_path.as_deref()) {
            (0, _) | (_, None) => &self.original_image_path,
            (_, Some(current)) => current,
        }
    }

    /// Ordered generator inputs: the effective input, then the reference when guided.
    pub fn edit_inputs(&self) -> EditInputs {
        let mut inputs = vec![self.effective_input().to_path_buf()];
        if self.mode == SessionMode::ReferenceGuided {
            if let Some(reference) = self.reference_image_path.as_ref() {
                inputs.push(reference.clone());
            }
        }
        EditInputs {
            inputs,
            mode: self.mode,
        }
    }

    pub fn fire_at(&self, role: TimerRole, timings: &SessionTimings) -> DateTime<Utc> {
        self.last_activity_at + timings.offset(role)
    }

    /// True once the cleanup deadline has passed.
    pub fn is_stale(&self, now: DateTime<Utc>, timings: &SessionTimings) -> bool {
        self.fire_at(TimerRole::Cleanup24h, timings) <= now
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    /// Structural checks applied when a record is loaded.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.reference_image_path.is_some() && self.mode != SessionMode::ReferenceGuided {
            return Err("reference image present but mode is prompt-only".to_string());
        }
        if self.reference_image_path.is_none() && self.mode == SessionMode::ReferenceGuided {
            return Err("reference-guided mode without a reference image".to_string());
        }
        if self.iteration_count > 0 && self.current_image_path.is_none() {
            return Err(format!(
                "iteration count {} without a current image",
                self.iteration_count
            ));
        }
        if self.last_activity_at < self.created_at {
            return Err("last activity precedes creation".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditInputs {
    pub inputs: Vec<PathBuf>,
    pub mode: SessionMode,
}

/// One user turn: an optional new reference image and an edit instruction.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub reference: Option<PathBuf>,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub session: Session,
    pub output_path: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub mode: SessionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderOutcome {
    Ignored,
    Reminded,
    CleanedUp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub rearmed: Vec<TimerRole>,
    pub fired: Vec<(TimerRole, ReminderOutcome)>,
    pub cancelled_orphans: usize,
    pub swept_files: usize,
    pub session_ended: bool,
}

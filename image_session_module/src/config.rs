use chrono::Duration as ChronoDuration;
use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::delivery::{Delivery, StdoutDelivery, TelegramDelivery, DEFAULT_TELEGRAM_API_BASE};
use crate::generator::CommandImageGenerator;
use crate::session::SessionTimings;
use crate::workspace::chat_workspace_dir;
use crate::BoxError;

const DEFAULT_STUDIO_COMMAND: &str = "python3 skills/image-studio/scripts/replicate_image.py";
const DEFAULT_STUDIO_MODEL: &str = "nano-banana-pro";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Stdout,
    Telegram,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub runtime_root: PathBuf,
    pub workspace_root: PathBuf,
    pub timer_db_path: PathBuf,
    pub inbound_dir: PathBuf,
    pub poll_interval: Duration,
    pub reminder_first: Duration,
    pub reminder_second: Duration,
    pub cleanup_after: Duration,
    pub delivery: DeliveryKind,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base_url: String,
    pub studio_command: Vec<String>,
    pub studio_model: String,
    pub studio_resolution: Option<String>,
    pub studio_aspect_ratio: Option<String>,
    pub studio_timeout: Duration,
    pub studio_allowed_prefixes: Vec<PathBuf>,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let runtime_root = match env_string("IMAGE_SESSION_ROOT") {
            Some(raw) => resolve_path(raw)?,
            None => default_runtime_root()?,
        };
        let workspace_root = env_path("IMAGE_SESSION_WORKSPACE_ROOT")?
            .unwrap_or_else(|| runtime_root.join("workspaces"));
        let timer_db_path = env_path("IMAGE_SESSION_TIMER_DB")?
            .unwrap_or_else(|| runtime_root.join("state").join("timers.db"));
        let inbound_dir = env_path("IMAGE_SESSION_INBOUND_DIR")?
            .unwrap_or_else(|| runtime_root.join("media").join("inbound"));

        let poll_interval = env_secs("IMAGE_SESSION_POLL_INTERVAL_SECS", 5);
        let mut reminder_first = env_secs("IMAGE_SESSION_REMINDER_FIRST_SECS", 2 * 60 * 60);
        let mut reminder_second = env_secs("IMAGE_SESSION_REMINDER_SECOND_SECS", 6 * 60 * 60);
        let mut cleanup_after = env_secs("IMAGE_SESSION_CLEANUP_SECS", 24 * 60 * 60);
        if !(reminder_first < reminder_second && reminder_second < cleanup_after) {
            warn!(
                "session timer offsets must be increasing ({}s, {}s, {}s); using defaults",
                reminder_first.as_secs(),
                reminder_second.as_secs(),
                cleanup_after.as_secs()
            );
            reminder_first = Duration::from_secs(2 * 60 * 60);
            reminder_second = Duration::from_secs(6 * 60 * 60);
            cleanup_after = Duration::from_secs(24 * 60 * 60);
        }

        let delivery = match env_string("IMAGE_SESSION_DELIVERY")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("stdout") => DeliveryKind::Stdout,
            Some("telegram") => DeliveryKind::Telegram,
            Some(other) => {
                return Err(format!("unknown IMAGE_SESSION_DELIVERY value: {}", other).into())
            }
        };
        let telegram_bot_token = env_string("TELEGRAM_BOT_TOKEN");
        let telegram_api_base_url = env_string("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());

        let studio_command = env_string("IMAGE_STUDIO_COMMAND")
            .unwrap_or_else(|| DEFAULT_STUDIO_COMMAND.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if studio_command.is_empty() {
            return Err("IMAGE_STUDIO_COMMAND is empty".into());
        }
        let studio_model =
            env_string("IMAGE_STUDIO_MODEL").unwrap_or_else(|| DEFAULT_STUDIO_MODEL.to_string());
        let studio_resolution =
            Some(env_string("IMAGE_STUDIO_RESOLUTION").unwrap_or_else(|| "2K".to_string()));
        let studio_aspect_ratio =
            Some(env_string("IMAGE_STUDIO_ASPECT_RATIO").unwrap_or_else(|| "auto".to_string()));
        let studio_timeout = env_secs("IMAGE_STUDIO_TIMEOUT_SECS", 300);
        let studio_allowed_prefixes = match env_string("IMAGE_STUDIO_ALLOWED_PREFIXES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| resolve_path(value.to_string()))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            runtime_root,
            workspace_root,
            timer_db_path,
            inbound_dir,
            poll_interval,
            reminder_first,
            reminder_second,
            cleanup_after,
            delivery,
            telegram_bot_token,
            telegram_api_base_url,
            studio_command,
            studio_model,
            studio_resolution,
            studio_aspect_ratio,
            studio_timeout,
            studio_allowed_prefixes,
        })
    }

    pub fn timings(&self) -> SessionTimings {
        let to_chrono = |value: Duration| {
            ChronoDuration::from_std(value).unwrap_or_else(|_| ChronoDuration::days(36_500))
        };
        let timings = SessionTimings {
            reminder_first: to_chrono(self.reminder_first),
            reminder_second: to_chrono(self.reminder_second),
            cleanup: to_chrono(self.cleanup_after),
        };
        if timings.is_valid() {
            timings
        } else {
            SessionTimings::default()
        }
    }

    pub fn workspace_for_chat(&self, chat: &str) -> PathBuf {
        chat_workspace_dir(&self.workspace_root, chat)
    }

    /// Delivery channel for one chat. Telegram needs both a bot token and a chat id.
    pub fn delivery_for_chat(&self, chat: Option<&str>) -> Result<Box<dyn Delivery>, BoxError> {
        match self.delivery {
            DeliveryKind::Stdout => Ok(Box::new(StdoutDelivery)),
            DeliveryKind::Telegram => {
                let token = self
                    .telegram_bot_token
                    .clone()
                    .ok_or("TELEGRAM_BOT_TOKEN is required for telegram delivery")?;
                let chat = chat.ok_or("telegram delivery requires --chat")?;
                Ok(Box::new(
                    TelegramDelivery::new(token, chat)
                        .with_api_base(self.telegram_api_base_url.clone()),
                ))
            }
        }
    }

    pub fn generator(&self) -> CommandImageGenerator {
        CommandImageGenerator {
            command: self.studio_command.clone(),
            model: self.studio_model.clone(),
            resolution: self.studio_resolution.clone(),
            aspect_ratio: self.studio_aspect_ratio.clone(),
            timeout: self.studio_timeout,
            allowed_prefixes: self.studio_allowed_prefixes.clone(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_path(key: &str) -> Result<Option<PathBuf>, io::Error> {
    env_string(key).map(resolve_path).transpose()
}

fn env_secs(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn default_runtime_root() -> Result<PathBuf, io::Error> {
    let home =
        env::var("HOME").map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".image_session"))
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}


use image_session_module::{DeliveryKind, SessionConfig};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const KEYS: &[&str] = &[
    "IMAGE_SESSION_ROOT",
    "IMAGE_SESSION_WORKSPACE_ROOT",
    "IMAGE_SESSION_TIMER_DB",
    "IMAGE_SESSION_INBOUND_DIR",
    "IMAGE_SESSION_POLL_INTERVAL_SECS",
    "IMAGE_SESSION_REMINDER_FIRST_SECS",
    "IMAGE_SESSION_REMINDER_SECOND_SECS",
    "IMAGE_SESSION_CLEANUP_SECS",
    "IMAGE_SESSION_DELIVERY",
    "IMAGE_STUDIO_COMMAND",
    "IMAGE_STUDIO_MODEL",
    "IMAGE_STUDIO_TIMEOUT_SECS",
    "IMAGE_STUDIO_RESOLUTION",
    "IMAGE_STUDIO_ASPECT_RATIO",
    "IMAGE_STUDIO_ALLOWED_PREFIXES",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_API_BASE_URL",
];

struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let original = env::var(key).ok();
        env::set_var(key, value);
        Self { key, original }
    }

    fn unset(key: &'static str) -> Self {
        let original = env::var(key).ok();
        env::remove_var(key);
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => env::set_var(self.key, value),
            None => env::remove_var(self.key),
        }
    }
}

fn clean_env() -> Vec<EnvGuard> {
    KEYS.iter().map(|key| EnvGuard::unset(*key)).collect()
}

#[test]
#[serial]
fn defaults_derive_from_the_runtime_root() {
    let temp = TempDir::new().expect("tempdir");
    let _clean = clean_env();
    let _root = EnvGuard::set("IMAGE_SESSION_ROOT", temp.path());

    let config = SessionConfig::from_env().expect("config");

    assert_eq!(config.workspace_root, temp.path().join("workspaces"));
    assert_eq!(config.timer_db_path, temp.path().join("state").join("timers.db"));
    assert_eq!(config.inbound_dir, temp.path().join("media").join("inbound"));
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.delivery, DeliveryKind::Stdout);
    assert_eq!(config.studio_model, "nano-banana-pro");
    assert_eq!(config.studio_resolution.as_deref(), Some("2K"));
    assert_eq!(config.studio_aspect_ratio.as_deref(), Some("auto"));
    assert_eq!(config.studio_timeout, Duration::from_secs(300));
    assert_eq!(
        config.studio_command,
        vec!["python3", "skills/image-studio/scripts/replicate_image.py"]
    );
    assert!(config.studio_allowed_prefixes.is_empty());

    let timings = config.timings();
    assert_eq!(timings.reminder_first, chrono::Duration::hours(2));
    assert_eq!(timings.reminder_second, chrono::Duration::hours(6));
    assert_eq!(timings.cleanup, chrono::Duration::hours(24));
}

#[test]
#[serial]
fn overrides_are_read_from_the_environment() {
    let temp = TempDir::new().expect("tempdir");
    let _clean = clean_env();
    let _root = EnvGuard::set("IMAGE_SESSION_ROOT", temp.path());
    let _first = EnvGuard::set("IMAGE_SESSION_REMINDER_FIRST_SECS", "60");
    let _second = EnvGuard::set("IMAGE_SESSION_REMINDER_SECOND_SECS", "120");
    let _cleanup = EnvGuard::set("IMAGE_SESSION_CLEANUP_SECS", "180");
    let _command = EnvGuard::set("IMAGE_STUDIO_COMMAND", "/usr/bin/env studio --fast");
    let _prefixes = EnvGuard::set("IMAGE_STUDIO_ALLOWED_PREFIXES", "/srv/media, /tmp ,");
    let _delivery = EnvGuard::set("IMAGE_SESSION_DELIVERY", "Telegram");

    let config = SessionConfig::from_env().expect("config");

    assert_eq!(config.reminder_first, Duration::from_secs(60));
    assert_eq!(config.cleanup_after, Duration::from_secs(180));
    assert_eq!(config.timings().reminder_second, chrono::Duration::minutes(2));
    assert_eq!(config.studio_command, vec!["/usr/bin/env", "studio", "--fast"]);
    assert_eq!(
        config.studio_allowed_prefixes,
        vec![PathBuf::from("/srv/media"), PathBuf::from("/tmp")]
    );
    assert_eq!(config.delivery, DeliveryKind::Telegram);
    assert!(config.delivery_for_chat(Some("42")).is_err());
}

#[test]
#[serial]
fn non_increasing_offsets_fall_back_to_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let _clean = clean_env();
    let _root = EnvGuard::set("IMAGE_SESSION_ROOT", temp.path());
    let _first = EnvGuard::set("IMAGE_SESSION_REMINDER_FIRST_SECS", "7200");
    let _second = EnvGuard::set("IMAGE_SESSION_REMINDER_SECOND_SECS", "3600");

    let config = SessionConfig::from_env().expect("config");

    assert_eq!(config.reminder_first, Duration::from_secs(7200));
    assert_eq!(config.reminder_second, Duration::from_secs(21600));
    assert_eq!(config.cleanup_after, Duration::from_secs(86400));
}

#[test]
#[serial]
fn unknown_delivery_kind_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let _clean = clean_env();
    let _root = EnvGuard::set("IMAGE_SESSION_ROOT", temp.path());
    let _delivery = EnvGuard::set("IMAGE_SESSION_DELIVERY", "carrier-pigeon");

    assert!(SessionConfig::from_env().is_err());
}

#[test]
#[serial]
fn chats_map_to_separate_workspaces() {
    let temp = TempDir::new().expect("tempdir");
    let _clean = clean_env();
    let _root = EnvGuard::set("IMAGE_SESSION_ROOT", temp.path());

    let config = SessionConfig::from_env().expect("config");

    let first = config.workspace_for_chat("chat-1");
    let second = config.workspace_for_chat("chat-2");
    assert_ne!(first, second);
    assert!(first.starts_with(&config.workspace_root));
}

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "chat_sync.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub server_url: String,
    /// Cadence of the fallback poll that runs once the push channel failed.
    pub primary_poll_interval: Duration,
    /// Cadence of the redundant poll that runs for the room's whole lifetime.
    pub backup_poll_interval: Duration,
    /// How long a fresh subscription may stay silent before it counts as timed out.
    pub subscribe_timeout: Duration,
    pub fetch_limit: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            primary_poll_interval: Duration::from_secs(3),
            backup_poll_interval: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(10),
            fetch_limit: 50,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    primary_poll_ms: Option<u64>,
    backup_poll_ms: Option<u64>,
    subscribe_timeout_ms: Option<u64>,
    fetch_limit: Option<u32>,
}

/// Defaults, then `chat_sync.toml` in the working directory, then
/// `CHAT_SYNC__*` environment overrides.
pub fn load_settings() -> SyncSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> SyncSettings {
    let mut settings = SyncSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("CHAT_SYNC__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(ms) = env_millis(&env, "CHAT_SYNC__PRIMARY_POLL_MS") {
        settings.primary_poll_interval = ms;
    }
    if let Some(ms) = env_millis(&env, "CHAT_SYNC__BACKUP_POLL_MS") {
        settings.backup_poll_interval = ms;
    }
    if let Some(ms) = env_millis(&env, "CHAT_SYNC__SUBSCRIBE_TIMEOUT_MS") {
        settings.subscribe_timeout = ms;
    }
    if let Some(v) = env("CHAT_SYNC__FETCH_LIMIT") {
        match v.parse::<u32>() {
            Ok(limit) if limit > 0 => settings.fetch_limit = limit,
            _ => warn!(value = %v, "ignoring invalid CHAT_SYNC__FETCH_LIMIT"),
        }
    }

    settings
}

fn apply_file_settings(settings: &mut SyncSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(ms) = file_cfg.primary_poll_ms.and_then(nonzero_millis) {
        settings.primary_poll_interval = ms;
    }
    if let Some(ms) = file_cfg.backup_poll_ms.and_then(nonzero_millis) {
        settings.backup_poll_interval = ms;
    }
    if let Some(ms) = file_cfg.subscribe_timeout_ms.and_then(nonzero_millis) {
        settings.subscribe_timeout = ms;
    }
    if let Some(limit) = file_cfg.fetch_limit.filter(|limit| *limit > 0) {
        settings.fetch_limit = limit;
    }
}

fn env_millis(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = env(key)?;
    let parsed = raw.parse::<u64>().ok().and_then(nonzero_millis);
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring invalid interval override");
    }
    parsed
}

fn nonzero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

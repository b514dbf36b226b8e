use std::{
    collections::HashMap,
    env, fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_settings_file(contents: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let n = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = env::temp_dir().join(format!("chat_sync_settings_{suffix}_{n}.toml"));
    fs::write(&path, contents).expect("write settings file");
    path
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_reference_cadence() {
    let settings = load_settings_from(Path::new("/nonexistent/chat_sync.toml"), env_from(&[]));

    assert_eq!(settings, SyncSettings::default());
    assert_eq!(settings.primary_poll_interval, Duration::from_secs(3));
    assert_eq!(settings.backup_poll_interval, Duration::from_secs(5));
}

#[test]
fn file_values_override_defaults() {
    let path = temp_settings_file(
        r#"
server_url = "https://chat.example.test"
primary_poll_ms = 1500
fetch_limit = 20
"#,
    );

    let settings = load_settings_from(&path, env_from(&[]));

    assert_eq!(settings.server_url, "https://chat.example.test");
    assert_eq!(settings.primary_poll_interval, Duration::from_millis(1500));
    assert_eq!(settings.backup_poll_interval, Duration::from_secs(5));
    assert_eq!(settings.fetch_limit, 20);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn environment_wins_over_file() {
    let path = temp_settings_file("backup_poll_ms = 9000\n");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("CHAT_SYNC__BACKUP_POLL_MS", "7000"),
            ("CHAT_SYNC__SERVER_URL", "http://10.0.0.2:9000"),
        ]),
    );

    assert_eq!(settings.backup_poll_interval, Duration::from_millis(7000));
    assert_eq!(settings.server_url, "http://10.0.0.2:9000");

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn zero_or_garbage_overrides_are_ignored() {
    let path = temp_settings_file("primary_poll_ms = 0\nfetch_limit = 0\n");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("CHAT_SYNC__SUBSCRIBE_TIMEOUT_MS", "soon"),
            ("CHAT_SYNC__FETCH_LIMIT", "-3"),
        ]),
    );

    assert_eq!(settings, SyncSettings::default());

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let path = temp_settings_file("primary_poll_ms = \"fast\"\n");

    let settings = load_settings_from(&path, env_from(&[]));

    assert_eq!(settings, SyncSettings::default());

    fs::remove_file(path).expect("cleanup");
}

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use host_monitor_lib::config::CONFIG_ENV_OVERRIDE;
use host_monitor_lib::metrics::CpuStream;
use host_monitor_lib::{ConfigError, SamplerConfig, MAX_HISTORY_CAPACITY};
use lazy_static::lazy_static;
use tempfile::TempDir;

lazy_static! {
    static ref TEST_ENV_GUARD: Mutex<()> = Mutex::new(());
}

struct ConfigTestEnv {
    dir: TempDir,
    prev_override: Option<String>,
}

impl ConfigTestEnv {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp config dir");
        let prev_override = std::env::var(CONFIG_ENV_OVERRIDE).ok();
        std::env::set_var(CONFIG_ENV_OVERRIDE, dir.path().join("config.json"));
        ConfigTestEnv { dir, prev_override }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    fn write(&self, contents: &str) {
        fs::write(self.config_path(), contents).expect("write config");
    }
}

impl Drop for ConfigTestEnv {
    fn drop(&mut self) {
        if let Some(prev) = self.prev_override.take() {
            std::env::set_var(CONFIG_ENV_OVERRIDE, prev);
        } else {
            std::env::remove_var(CONFIG_ENV_OVERRIDE);
        }
    }
}

fn acquire_env_guard() -> std::sync::MutexGuard<'static, ()> {
    TEST_ENV_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn missing_file_yields_defaults() {
    let _guard = acquire_env_guard();
    let env = ConfigTestEnv::new();

    assert_eq!(SamplerConfig::default_path(), Some(env.config_path()));
    let config = SamplerConfig::load();
    assert_eq!(config, SamplerConfig::default());
    assert_eq!(config.cpu_period_ms, 1000);
    assert_eq!(config.memory_period_ms, 1000);
    assert_eq!(config.history_capacity, 240);
}

#[test]
fn partial_file_overrides_only_given_fields() {
    let _guard = acquire_env_guard();
    let env = ConfigTestEnv::new();
    env.write(r#"{ "history_capacity": 60, "hidden_mount_prefixes": ["/boot"] }"#);

    let config = SamplerConfig::load();
    assert_eq!(config.history_capacity, 60);
    assert_eq!(config.hidden_mount_prefixes, vec!["/boot".to_string()]);
    assert_eq!(config.cpu_period_ms, 1000);
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let _guard = acquire_env_guard();
    let env = ConfigTestEnv::new();
    env.write("{ not json");

    assert!(matches!(
        SamplerConfig::from_path(&env.config_path()),
        Err(ConfigError::Parse(..))
    ));
    assert_eq!(SamplerConfig::load(), SamplerConfig::default());
}

#[test]
fn tiny_periods_are_raised() {
    let _guard = acquire_env_guard();
    let env = ConfigTestEnv::new();
    env.write(r#"{ "cpu_period_ms": 0, "memory_period_ms": 3 }"#);

    let config = SamplerConfig::load();
    assert_eq!(config.cpu_period_ms, 10);
    assert_eq!(config.memory_period_ms, 10);
}

#[test]
fn oversized_history_capacity_is_capped() {
    let _guard = acquire_env_guard();
    let env = ConfigTestEnv::new();
    env.write(r#"{ "history_capacity": 18446744073709551615 }"#);

    let config = SamplerConfig::load();
    assert_eq!(config.history_capacity, MAX_HISTORY_CAPACITY);

    let stream = CpuStream::new(config.history_capacity);
    assert_eq!(stream.history().capacity(), MAX_HISTORY_CAPACITY);
    assert!(stream.history().is_empty());
}

#[test]
fn unreadable_path_is_an_io_error() {
    let dir = TempDir::new().expect("temp dir");
    let err = SamplerConfig::from_path(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
    assert!(err.to_string().contains("absent.json"));
}

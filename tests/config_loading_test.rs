//! Loading the shipped configuration and layering overrides on top of it.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use pilot_watchdog::domain::models::{MemoryLimit, ThresholdRegistry};
use pilot_watchdog::infrastructure::config::{ConfigError, ConfigLoader};

fn default_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/default.yaml")
}

#[test]
fn test_shipped_config_matches_reference_thresholds() {
    temp_env::with_vars_unset(["PILOT_PILOT__HEARTBEAT", "PILOT_PILOT__PROBE_TIMEOUT", "PILOT_LOGGING__LEVEL"], || {
        let (config, registry) = ConfigLoader::load_registry(default_config()).unwrap();

        assert_eq!(registry, ThresholdRegistry::reference());
        assert!(ConfigLoader::proxy_settings(&config).unwrap().is_none());
        assert!(config.harvester.heartbeat_message.is_none());
        assert_eq!(config.logging.level, "info");
    });
}

#[test]
fn test_environment_overrides_file() {
    temp_env::with_vars(
        [
            ("PILOT_PILOT__HEARTBEAT", Some("900")),
            ("PILOT_PILOT__PROBE_TIMEOUT", Some("10s")),
            ("PILOT_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let (config, registry) = ConfigLoader::load_registry(default_config()).unwrap();

            assert_eq!(registry.heartbeat_period, Duration::from_secs(900));
            assert_eq!(registry.probe_timeout, Duration::from_secs(10));
            assert_eq!(registry.memory_limit("SCORE_LOMEM"), MemoryLimit::Unbounded);
            assert_eq!(config.logging.level, "debug");
        },
    );
}

#[test]
fn test_missing_file_is_reported() {
    let err = ConfigLoader::load_registry("/nonexistent/pilot.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn test_probe_timeout_must_fit_smallest_interval() {
    let shipped = std::fs::read_to_string(default_config()).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", shipped.replace("probe_timeout: 30", "probe_timeout: 90")).unwrap();

    temp_env::with_var_unset("PILOT_PILOT__PROBE_TIMEOUT", || {
        match ConfigLoader::load_registry(file.path()) {
            Err(ConfigError::ProbeTimeoutTooLarge { interval_name, .. }) => {
                assert_eq!(interval_name, "memory_check_interval");
            }
            other => panic!("expected ProbeTimeoutTooLarge, got {other:?}"),
        }
    });
}

#[test]
fn test_humantime_and_unit_strings_accepted() {
    let shipped = std::fs::read_to_string(default_config()).unwrap();
    let yaml = shipped
        .replace("lost_heartbeat: 10800", "lost_heartbeat: 3h")
        .replace("free_space_limit_running: \"1 GB\"", "free_space_limit_running: \"1024 MiB\"");

    let config = ConfigLoader::load_from_str(&yaml).unwrap();
    let registry = ConfigLoader::build_registry(&config).unwrap();
    assert_eq!(registry, ThresholdRegistry::reference());
}

use std::io::Write;

use call_guard::logging::{setup_logging, LoggingConfig};
use call_guard::{CallGuardConfig, CallGuardError};
use serial_test::serial;
use tracing::Level;

#[test]
#[serial]
fn test_logging_installs_once() {
    assert!(setup_logging(LoggingConfig::new(Level::DEBUG, "call-guard-test")).is_ok());

    let second = setup_logging(LoggingConfig::new(Level::INFO, "call-guard-test").with_json());
    assert!(matches!(second, Err(CallGuardError::Config(_))));
}

#[test]
#[serial]
fn test_config_file_round_trip() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[database]
url = "sqlite://calls.db?mode=rwc"

[decision]
lookup_timeout_ms = 750
suffix_match_digits = 9

[tracker]
missed_call_threshold_secs = 4
"#
    )?;

    let config = CallGuardConfig::from_file(file.path())?;
    assert_eq!(config.database.url, "sqlite://calls.db?mode=rwc");
    assert_eq!(config.decision.lookup_timeout_ms, 750);
    assert_eq!(config.decision.suffix_match_digits, 9);
    assert_eq!(config.tracker.missed_call_threshold_secs, 4);
    // untouched sections keep their defaults
    assert_eq!(config.control.attempt_timeout_ms, 1500);
    assert_eq!(config.tracker.unresolved_capacity, 16);
    Ok(())
}

#[test]
fn test_missing_config_file_is_config_error() {
    let err = CallGuardConfig::from_file("/nonexistent/call-guard.toml").unwrap_err();
    assert!(matches!(err, CallGuardError::Config(_)));
}

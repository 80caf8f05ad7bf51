use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;
use crate::error::{CallGuardError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Application name to include in logs
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            app_name: "call-guard".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Build from the `[logging]` section of the configuration file
    pub fn from_settings(settings: &LogSettings, app_name: impl Into<String>) -> Result<Self> {
        Ok(LoggingConfig {
            level: parse_log_level(&settings.level)?,
            json: settings.json,
            file_info: settings.file_info,
            app_name: app_name.into(),
        })
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives are honoured on top of the configured level. Logs go
/// to stderr so command output on stdout stays machine readable.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CallGuardError::config(format!("logging already initialized: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| CallGuardError::config(format!("Invalid log level: {}", level)))
}

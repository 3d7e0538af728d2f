//! Tracing subscriber setup and log-line hygiene

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;
use crate::error::{Result, SipEventError};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
    /// Application name printed in the welcome line
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            app_name: "ccm".to_string(),
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

    /// Build from the `[logging]` section of the service configuration
    pub fn from_section(section: &LoggingSection, app_name: impl Into<String>) -> Result<Self> {
        let mut config = Self::new(parse_log_level(&section.level)?, app_name);
        config.json = section.json;
        Ok(config)
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr. `RUST_LOG` directives are honored on top of the
/// configured level. Calling this a second time leaves the first subscriber
/// in place.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed, keeping the existing one");
    }

    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| SipEventError::config(format!("Invalid log level: {}", level)))
}

pub fn log_welcome(config: &LoggingConfig, version: &str) {
    tracing::info!("Starting {} v{}", config.app_name, version);
}

/// Strip line breaks from externally supplied text before it reaches a log line.
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_sanitize_strips_line_breaks() {
        assert_eq!(sanitize("call-1\r\nINFO forged"), "call-1INFO forged");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[test]
    fn test_from_section() {
        let section = LoggingSection {
            level: "trace".to_string(),
            json: true,
        };
        let config = LoggingConfig::from_section(&section, "ccm-test").unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.json);
        assert_eq!(config.app_name, "ccm-test");
    }
}

//! Configuration for the SIP event engine
//!
//! Values come from defaults, an optional TOML file and `CCM_*` environment
//! variables, in that order of precedence (later wins).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SipEventError};

/// Environment variable overriding [`SipEventConfig::sip_domain`]
pub const ENV_SIP_DOMAIN: &str = "CCM_SIP_DOMAIN";
/// Environment variable overriding [`SipEventConfig::enabled`]
pub const ENV_ENABLED: &str = "CCM_SIP_EVENTS_ENABLED";
/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "CCM_LOG_LEVEL";
/// Environment variable switching JSON log output on or off
pub const ENV_LOG_JSON: &str = "CCM_LOG_JSON";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SipEventConfig {
    /// When false every inbound event is acknowledged and ignored
    pub enabled: bool,
    /// SIP domain used when computing display names
    pub sip_domain: String,
    /// Localization key requested for telephone parties
    pub telephone_category_key: String,
    /// Registration type tag that marks an explicit deletion
    pub deletion_reg_type: String,
    /// SIP methods that must never be treated as call progress
    pub termination_methods: Vec<String>,
    /// How long closed calls are remembered so redelivered events stay no-ops
    pub closed_call_retention_secs: u64,
    /// Buffer size of the result broadcast channel
    pub notification_capacity: usize,
    pub logging: LoggingSection,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for SipEventConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sip_domain: "example.com".to_string(),
            telephone_category_key: "Telephone".to_string(),
            deletion_reg_type: "delete".to_string(),
            termination_methods: vec!["BYE".to_string()],
            closed_call_retention_secs: 3600,
            notification_capacity: 256,
            logging: LoggingSection::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SipEventConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without consulting the environment
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(domain) = std::env::var(ENV_SIP_DOMAIN) {
            self.sip_domain = domain;
        }
        if let Ok(enabled) = std::env::var(ENV_ENABLED) {
            self.enabled = parse_bool(ENV_ENABLED, &enabled)?;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var(ENV_LOG_JSON) {
            self.logging.json = parse_bool(ENV_LOG_JSON, &json)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.deletion_reg_type.trim().is_empty() {
            return Err(SipEventError::config("deletion_reg_type must not be empty"));
        }
        if self.telephone_category_key.trim().is_empty() {
            return Err(SipEventError::config("telephone_category_key must not be empty"));
        }
        if self.notification_capacity == 0 {
            return Err(SipEventError::config("notification_capacity must be greater than zero"));
        }
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }

    /// True if `method` contains one of the configured termination methods
    pub fn is_termination_method(&self, method: &str) -> bool {
        let method = method.to_ascii_uppercase();
        self.termination_methods
            .iter()
            .any(|m| !m.is_empty() && method.contains(&m.to_ascii_uppercase()))
    }

    pub fn closed_call_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.closed_call_retention_secs.min(i64::MAX as u64) as i64)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SipEventError::config(format!("{} must be a boolean, got '{}'", name, other))),
    }
}

//! Configuration module
//!
//! Settings are read from a TOML file, by default
//! `~/.config/evse-engine/config.toml` (overridable with `EVSE_CONFIG`).
//! Every key has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "EVSE_CONFIG";

/// Upper bound for configured reservation durations (30 days)
pub const MAX_RESERVATION_DURATION_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub evse: EvseConfig,
    pub simulation: SimulationConfig,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `evse_engine=debug`, ...); `RUST_LOG` wins
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Per-EVSE engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvseConfig {
    pub id: String,
    /// Entries kept per status history
    pub status_history_size: usize,
    pub max_reservation_duration_secs: u64,
    pub default_reservation_duration_secs: u64,
    pub expiry_check_interval_secs: u64,
    pub metering_interval_secs: u64,
    /// Nominal power used to estimate delivered energy
    pub rated_power_kw: f64,
    pub allow_reservation_while_charging: bool,
    /// Identities authorized locally; unset means authorization is delegated
    pub local_auth_list: Option<Vec<String>>,
}

impl Default for EvseConfig {
    fn default() -> Self {
        Self {
            id: "EVSE-001".to_string(),
            status_history_size: 50,
            max_reservation_duration_secs: 900,
            default_reservation_duration_secs: 900,
            expiry_check_interval_secs: 60,
            metering_interval_secs: 10,
            rated_power_kw: 22.0,
            allow_reservation_while_charging: false,
            local_auth_list: None,
        }
    }
}

/// Scenario driven by the `evse-sim` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub provider_id: String,
    pub auth_identity: String,
    /// How long the simulated session charges before it is stopped
    pub session_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            provider_id: "DE-SIM".to_string(),
            auth_identity: "TAG-0001".to_string(),
            session_secs: 30,
        }
    }
}

impl AppConfig {
    /// Read and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let evse = &self.evse;
        if evse.id.trim().is_empty() {
            return Err(ConfigError::Invalid("evse.id must not be empty".into()));
        }
        if evse.status_history_size == 0 {
            return Err(ConfigError::Invalid(
                "evse.status_history_size must be at least 1".into(),
            ));
        }
        if evse.expiry_check_interval_secs == 0 || evse.metering_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "evse intervals must be greater than zero".into(),
            ));
        }
        if evse.max_reservation_duration_secs == 0
            || evse.max_reservation_duration_secs > MAX_RESERVATION_DURATION_SECS
        {
            return Err(ConfigError::Invalid(format!(
                "evse.max_reservation_duration_secs must be between 1 and {}",
                MAX_RESERVATION_DURATION_SECS
            )));
        }
        if evse.default_reservation_duration_secs == 0
            || evse.default_reservation_duration_secs > evse.max_reservation_duration_secs
        {
            return Err(ConfigError::Invalid(
                "evse.default_reservation_duration_secs must be between 1 and max_reservation_duration_secs".into(),
            ));
        }
        if !(evse.rated_power_kw.is_finite() && evse.rated_power_kw >= 0.0) {
            return Err(ConfigError::Invalid(
                "evse.rated_power_kw must be a non-negative number".into(),
            ));
        }
        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                other
            ))),
        }
    }
}

/// `$EVSE_CONFIG`, or `~/.config/evse-engine/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evse-engine")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.evse.status_history_size, 50);
        assert_eq!(config.evse.max_reservation_duration_secs, 900);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [logging]
            format = "json"

            [evse]
            id = "DE*ABC*E1"
            rated_power_kw = 11.0
            local_auth_list = ["TAG-1", "TAG-2"]
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.evse.id, "DE*ABC*E1");
        assert_eq!(config.evse.rated_power_kw, 11.0);
        assert_eq!(config.evse.metering_interval_secs, 10);
        assert_eq!(config.evse.local_auth_list.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = AppConfig::from_toml_str("[evse]\nexpiry_check_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reservation_durations_are_bounded() {
        for raw in [
            "[evse]\ndefault_reservation_duration_secs = 0\n",
            "[evse]\ndefault_reservation_duration_secs = 1800\nmax_reservation_duration_secs = 900\n",
            "[evse]\nmax_reservation_duration_secs = 10000000000000000\n",
        ] {
            let err = AppConfig::from_toml_str(raw).unwrap_err();
            assert!(err.to_string().contains("reservation_duration_secs"), "{}", raw);
        }

        let config = AppConfig::from_toml_str(
            "[evse]\ndefault_reservation_duration_secs = 600\nmax_reservation_duration_secs = 3600\n",
        )
        .unwrap();
        assert_eq!(config.evse.default_reservation_duration_secs, 600);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = AppConfig::from_toml_str("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = AppConfig::from_toml_str("[evse\nid = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load("/definitely/not/here/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        assert!(default_config_path().ends_with("config.toml"));
    }
}

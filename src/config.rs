//! # Configuration — [EXPANSION, ambient]
//!
//! A `Config` loaded via `figment` (`Toml::file` + `Env::prefixed`),
//! grounded on the teacher's own `src/config.rs`: monitoring level,
//! default query timeout, whether `run()` defaults to debug mode, and
//! logging level/format. Ships a `Default` impl so the frontend is usable
//! with no file present.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// How much diagnostic detail a run should surface. Mirrors the
/// `monitoring_level` argument threaded through `run()`/`run_all()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringLevel {
    None,
    InOut,
    All,
}

impl Default for MonitoringLevel {
    fn default() -> Self {
        MonitoringLevel::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::default(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level frontend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default monitoring level for `run()`/`run_all()` when the caller
    /// doesn't override it in `RunOptions`.
    #[serde(default)]
    pub default_monitoring_level: MonitoringLevel,

    /// Default query timeout in milliseconds; `None` means no timeout.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// Whether `run()` defaults to debug mode (validating intermediate
    /// column names against the user-visible schema) when unspecified.
    #[serde(default)]
    pub debug_by_default: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_monitoring_level: MonitoringLevel::default(),
            default_timeout_ms: None,
            debug_by_default: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Layers `config.toml` (if present) under `ENGINE_`-prefixed
    /// environment variables, same layering order as the teacher's loader.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_timeout_and_no_monitoring() {
        let config = Config::default();
        assert_eq!(config.default_timeout_ms, None);
        assert_eq!(config.default_monitoring_level, MonitoringLevel::None);
        assert!(!config.debug_by_default);
    }

    #[test]
    fn load_without_any_file_or_env_falls_back_to_defaults() {
        let config: Config = Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .extract()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
    }
}

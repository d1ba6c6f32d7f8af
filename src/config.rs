//! Configuration loading.
//!
//! Settings come from `config/config.toml` (optional) overlaid with
//! environment variables such as `LARDER__DATABASE__URL`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub use crate::pool::config::DatabaseConfig;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "LARDER";

/// `[reservations]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Upper bound for every statement of a write transaction; 0 disables it.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_statement_timeout_ms() -> u64 {
    5_000
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout_ms(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

/// `[metrics]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:9898".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LarderConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reservations: ReservationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LarderConfig {
    /// Load from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env_source());

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(env_source())
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize::<LarderConfig>().map_err(|e| {
            ConfigError::Message(format!("Larder configuration is invalid: {e}"))
        })
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

//! Configuration management for the bridge.

use std::env;
use std::time::Duration;

/// Bridge configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Ask the native side to drop its caches during library startup
    pub clear_cache_on_startup: bool,
    /// Upper bound for every native call
    pub native_timeout: Duration,
    /// Log filter used by the replay binary
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            clear_cache_on_startup: true,
            native_timeout: Duration::from_millis(30_000),
            log_filter: "photokit_bridge=debug".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let clear_cache_on_startup = match env::var("PHOTOKIT_CLEAR_CACHE_ON_STARTUP") {
            Ok(value) => parse_bool(&value)
                .ok_or(ConfigError::InvalidBool("PHOTOKIT_CLEAR_CACHE_ON_STARTUP"))?,
            Err(_) => defaults.clear_cache_on_startup,
        };

        let native_timeout = match env::var("PHOTOKIT_NATIVE_TIMEOUT_MS") {
            Ok(value) => value
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidTimeout)?,
            Err(_) => defaults.native_timeout,
        };

        let log_filter = env::var("PHOTOKIT_LOG").unwrap_or(defaults.log_filter);

        Ok(Self {
            clear_cache_on_startup,
            native_timeout,
            log_filter,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a boolean")]
    InvalidBool(&'static str),

    #[error("Invalid PHOTOKIT_NATIVE_TIMEOUT_MS value")]
    InvalidTimeout,
}

//! # Server Configuration
//!
//! ```toml
//! tick_rate = 60
//! npc_count = 2000
//!
//! [reset]
//! worker_threads = 4
//! barrier_timeout_ms = 250
//! ```

use std::path::Path;

use emberline_core::error::ConfigResult;
use emberline_core::{ConfigError, ResetConfig};
use serde::Deserialize;

/// Default server tick rate (Hz).
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Highest tick rate the clock accepts.
pub const MAX_TICK_RATE: u32 = 1000;

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// NPCs spawned at startup.
    pub npc_count: usize,
    /// Reset phase settings.
    pub reset: ResetConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            npc_count: 2000,
            reset: ResetConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// the same errors as [`ServerConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded server config");
        Ok(config)
    }

    /// Checks every value is in range, including the reset section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::Invalid(format!(
                "tick_rate = {} must be between 1 and {MAX_TICK_RATE}",
                self.tick_rate
            )));
        }
        if self.npc_count > self.reset.max_entities {
            return Err(ConfigError::Invalid(format!(
                "npc_count = {} exceeds reset.max_entities = {}",
                self.npc_count, self.reset.max_entities
            )));
        }
        self.reset.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_nested_reset_section() {
        let config = ServerConfig::from_toml_str(
            r#"
            tick_rate = 20
            npc_count = 100

            [reset]
            worker_threads = 2
            barrier_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.npc_count, 100);
        assert_eq!(config.reset.worker_threads, 2);
        assert_eq!(config.reset.barrier_timeout_ms, Some(500));
        assert_eq!(config.reset.thread_name, "reset-worker");
    }

    #[test]
    fn test_rejects_bad_values() {
        for text in [
            "tick_rate = 0",
            "tick_rate = 5000",
            "npc_count = 10\n[reset]\nmax_entities = 5",
            "[reset]\nbarrier_timeout_ms = 0",
        ] {
            assert!(
                matches!(ServerConfig::from_toml_str(text), Err(ConfigError::Invalid(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_unknown_key_in_reset_section() {
        let result = ServerConfig::from_toml_str("[reset]\nworkers = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

//! # Reset Phase Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! worker_threads = 4        # 0 = run resets inline on the main thread
//! barrier_timeout_ms = 250  # optional stall detection
//! max_entities = 8192
//! thread_name = "reset-worker"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Hard ceiling on pool size. Anything above this is a typo.
pub const MAX_WORKER_THREADS: usize = 1024;

/// Configuration for the parallel reset phase.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    /// Number of reset worker threads. Zero runs resets inline.
    pub worker_threads: usize,
    /// How long the main thread waits for a reset phase before giving up.
    /// Unset means wait forever.
    pub barrier_timeout_ms: Option<u64>,
    /// Maximum number of live entities in the world.
    pub max_entities: usize,
    /// Name prefix for worker threads.
    pub thread_name: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            barrier_timeout_ms: None,
            max_entities: 8192,
            thread_name: "reset-worker".to_string(),
        }
    }
}

impl ResetConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys,
    /// and [`ConfigError::Invalid`] for out-of-range values.
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
    /// the same errors as [`ResetConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(ConfigError::Invalid(format!(
                "worker_threads = {} exceeds the maximum of {MAX_WORKER_THREADS}",
                self.worker_threads
            )));
        }
        if self.max_entities == 0 {
            return Err(ConfigError::Invalid("max_entities must be greater than zero".into()));
        }
        if u32::try_from(self.max_entities).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_entities = {} does not fit a 32-bit slot index",
                self.max_entities
            )));
        }
        if self.barrier_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "barrier_timeout_ms must be greater than zero; omit it to wait forever".into(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid("thread_name must not be empty".into()));
        }
        Ok(())
    }

    /// Returns the barrier timeout, if one is configured.
    #[must_use]
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ResetConfig::default();
        assert!(config.worker_threads >= 1);
        assert!(config.validate().is_ok());
        assert_eq!(config.barrier_timeout(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ResetConfig::from_toml_str(
            r#"
            worker_threads = 4
            barrier_timeout_ms = 250
            max_entities = 2000
            thread_name = "npc-reset"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.barrier_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_entities, 2000);
        assert_eq!(config.thread_name, "npc-reset");
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = ResetConfig::from_toml_str("worker_threads = 0").unwrap();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.max_entities, ResetConfig::default().max_entities);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ResetConfig::from_toml_str("worker_thread = 4");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for text in [
            "max_entities = 0",
            "barrier_timeout_ms = 0",
            "worker_threads = 5000",
            "thread_name = \"  \"",
        ] {
            let result = ResetConfig::from_toml_str(text);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "accepted: {text}");
        }
    }

    #[test]
    fn test_missing_file() {
        let result = ResetConfig::from_file("/nonexistent/emberline/reset.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

use std::path::Path;
use std::time::Duration;
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combinators::MergeFlatOptions;
use crate::core::stream::{DisposedPolicy, StreamOptions};
use crate::core::trigger::Trigger;
use crate::core::upstream::{Lazy, UpstreamOptions};
use crate::ops::{DebounceOptions, ThrottleOptions, TimeoutPingOptions};
use crate::sources::ResolveOptions;

/// Environment variable naming the JSON file read by [`RxConfig::load`].
pub const CONFIG_FILE_ENV: &str = "RX_CONFIG_FILE";

#[derive(Debug, Error)]
pub enum RxConfigError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error occurred: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Environment variable error: {0}")]
    VarError(#[from] env::VarError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine-wide defaults. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub pacing_ms: u64,
    pub queue_capacity: usize,
    pub lazy: Lazy,
    pub disposed_policy: DisposedPolicy,
    pub throttle_ms: u64,
    pub debounce_ms: u64,
    pub merge_idle_min_ms: u64,
    pub merge_idle_max_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 5,
            queue_capacity: 64,
            lazy: Lazy::Initial,
            disposed_policy: DisposedPolicy::Ignore,
            throttle_ms: 100,
            debounce_ms: 100,
            merge_idle_min_ms: 5,
            merge_idle_max_ms: 100,
            timeout_ms: 1000,
        }
    }
}

impl RxConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RxConfigError> {
        let config: RxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RxConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        log::debug!("Loading rx configuration from {}", path.as_ref().display());
        Self::from_json_str(&raw)
    }

    /// Reads the file named by `RX_CONFIG_FILE`, or returns the defaults when the
    /// variable is not set.
    pub fn load() -> Result<Self, RxConfigError> {
        match env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_file(path),
            Err(env::VarError::NotPresent) => {
                log::debug!("{} not set, using default rx configuration", CONFIG_FILE_ENV);
                Ok(Self::default())
            }
            Err(e) => Err(RxConfigError::VarError(e)),
        }
    }

    fn validate(&self) -> Result<(), RxConfigError> {
        if self.queue_capacity == 0 {
            return Err(RxConfigError::Invalid("queue_capacity must be at least 1".to_string()));
        }
        if self.merge_idle_min_ms == 0 || self.merge_idle_max_ms < self.merge_idle_min_ms {
            return Err(RxConfigError::Invalid(format!(
                "merge idle range {}..{} ms is invalid",
                self.merge_idle_min_ms, self.merge_idle_max_ms
            )));
        }
        Ok(())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            interval: Trigger::Literal(Duration::from_millis(self.pacing_ms)),
            lazy: self.lazy,
            capacity: self.queue_capacity,
            label: None,
        }
    }

    pub fn upstream_options(&self) -> UpstreamOptions {
        UpstreamOptions::with_lazy(self.lazy)
    }

    pub fn stream_options<V>(&self) -> StreamOptions<V> {
        StreamOptions {
            disposed_policy: self.disposed_policy,
            ..Default::default()
        }
    }

    pub fn throttle_options(&self) -> ThrottleOptions {
        ThrottleOptions {
            elapsed: Trigger::Literal(Duration::from_millis(self.throttle_ms)),
            upstream: self.upstream_options(),
        }
    }

    pub fn debounce_options(&self) -> DebounceOptions {
        DebounceOptions {
            elapsed: Trigger::Literal(Duration::from_millis(self.debounce_ms)),
            upstream: self.upstream_options(),
        }
    }

    pub fn merge_flat_options(&self) -> MergeFlatOptions {
        MergeFlatOptions {
            idle_min: Duration::from_millis(self.merge_idle_min_ms),
            idle_max: Duration::from_millis(self.merge_idle_max_ms),
            upstream: self.upstream_options(),
        }
    }

    pub fn timeout_ping_options(&self) -> TimeoutPingOptions {
        TimeoutPingOptions {
            interval: Trigger::Literal(Duration::from_millis(self.timeout_ms)),
            abort: None,
            upstream: self.upstream_options(),
        }
    }
}

impl fmt::Display for RxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RxConfig
    Pacing: {} ms,
    Queue capacity: {},
    Lazy: {:?},
    Disposed policy: {:?},
    Throttle: {} ms,
    Debounce: {} ms,
    Merge idle: {}..{} ms,
    Timeout: {} ms
",
            self.pacing_ms,
            self.queue_capacity,
            self.lazy,
            self.disposed_policy,
            self.throttle_ms,
            self.debounce_ms,
            self.merge_idle_min_ms,
            self.merge_idle_max_ms,
            self.timeout_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RxConfig::from_json_str(r#"{"pacing_ms": 20, "lazy": "very"}"#).unwrap();
        assert_eq!(config.pacing_ms, 20);
        assert_eq!(config.lazy, Lazy::Very);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.disposed_policy, DisposedPolicy::Ignore);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"disposed_policy": "error", "throttle_ms": 250}}"#).unwrap();
        let config = RxConfig::from_file(file.path()).unwrap();
        assert_eq!(config.disposed_policy, DisposedPolicy::Error);
        assert_eq!(config.throttle_options().elapsed.resolve(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = RxConfig::from_json_str(r#"{"queue_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, RxConfigError::Invalid(_)));
        let err = RxConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, RxConfigError::JsonError(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RxConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, RxConfigError::IoError(_)));
    }

    // The only test touching RX_CONFIG_FILE.
    #[test]
    fn test_load_follows_env_var() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"timeout_ms": 42}}"#).unwrap();

        env::set_var(CONFIG_FILE_ENV, file.path());
        let config = RxConfig::load().unwrap();
        assert_eq!(config.timeout_ms, 42);

        env::remove_var(CONFIG_FILE_ENV);
        assert_eq!(RxConfig::load().unwrap(), RxConfig::default());
    }

    #[test]
    fn test_display_summary() {
        let text = RxConfig::default().to_string();
        assert!(text.contains("Pacing: 5 ms"));
        assert!(text.contains("Merge idle: 5..100 ms"));
    }
}

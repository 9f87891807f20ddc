//! Configuration sections consumed by the gate.
//!
//! Every section deserializes with defaults for missing fields, so an empty
//! document yields the stock setup (`smartdrop:8080`, 50 slots, refresh every
//! 10 000 requests or 2 seconds).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// A configuration value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration value for `{field}`: {reason}")]
pub struct ConfigError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: &'static str,
}

/// Top-level gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Coordination service connection.
    pub lock: LockConfig,
    /// Whitelist table and source file.
    pub whitelist: WhitelistConfig,
    /// Refresh trigger policy.
    pub refresh: RefreshConfig,
    /// Candidate selection rules.
    pub selection: SelectionConfig,
}

impl GateConfig {
    /// Reject values that would make the gate unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lock.validate()?;
        self.whitelist.validate()?;
        self.refresh.validate()
    }
}

/// Where the coordination service lives and how long to wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Hostname of the coordination service.
    pub host: String,
    /// TCP port of the coordination service.
    pub port: u16,
    /// Upper bound for resolving and connecting.
    pub connect_timeout_ms: u64,
    /// Upper bound for each acquire or release handshake.
    pub request_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            host: "smartdrop".to_string(),
            port: 8080,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 2_000,
        }
    }
}

impl LockConfig {
    /// `host:port`, suitable for name resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect deadline as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Handshake deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError {
                field: "lock.host",
                reason: "must not be empty",
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError {
                field: "lock.connect_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError {
                field: "lock.request_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Shape of the whitelist table and location of its source file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// Shared CSV file written by the control plane.
    pub path: PathBuf,
    /// Number of slots, which is also the maximum number of entries.
    pub capacity: usize,
    /// How many distinct keys may share one slot.
    pub max_bucket_depth: usize,
    /// Longest canonical key accepted, in bytes.
    pub max_key_len: usize,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/Whitelist/whitelist.csv"),
            capacity: 50,
            max_bucket_depth: 4,
            max_key_len: 2_048,
        }
    }
}

impl WhitelistConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError {
                field: "whitelist.capacity",
                reason: "must be greater than zero",
            });
        }
        if self.max_bucket_depth == 0 {
            return Err(ConfigError {
                field: "whitelist.max_bucket_depth",
                reason: "must be greater than zero",
            });
        }
        if self.max_key_len == 0 {
            return Err(ConfigError {
                field: "whitelist.max_key_len",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// When a selection call should kick off a refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Refresh after this many selections.
    pub request_threshold: u64,
    /// Refresh after this much time, in milliseconds.
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            request_threshold: 10_000,
            interval_ms: 2_000,
        }
    }
}

impl RefreshConfig {
    /// Time-based trigger as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_threshold == 0 {
            return Err(ConfigError {
                field: "refresh.request_threshold",
                reason: "must be greater than zero",
            });
        }
        if self.interval_ms == 0 {
            return Err(ConfigError {
                field: "refresh.interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Rules applied while building keys and scanning candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Request paths rewritten before the key is built.
    pub path_aliases: HashMap<String, String>,
    /// Server ids whose whitelist token is not their last character.
    pub token_aliases: HashMap<String, char>,
    /// Also skip non-permitted candidates that are not the avoided server.
    pub enforce_permitted: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            path_aliases: HashMap::from([(
                "/wp-profiling/".to_string(),
                "/wp-profiling/index.php".to_string(),
            )]),
            token_aliases: HashMap::from([("WP-Host".to_string(), '1')]),
            enforce_permitted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock.address(), "smartdrop:8080");
        assert_eq!(config.refresh.interval(), Duration::from_secs(2));
        assert_eq!(config.whitelist.capacity, 50);
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = GateConfig::default();
        config.whitelist.capacity = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "whitelist.capacity");
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = GateConfig::default();
        config.lock.request_timeout_ms = 0;
        assert_eq!(config.validate().unwrap_err().field, "lock.request_timeout_ms");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: GateConfig = serde_yaml::from_str(
            "lock:\n  host: coordinator\nselection:\n  token_aliases:\n    edge-a: \"7\"\n",
        )
        .unwrap();
        assert_eq!(config.lock.host, "coordinator");
        assert_eq!(config.lock.port, 8080);
        assert_eq!(config.selection.token_aliases.get("edge-a"), Some(&'7'));
        assert_eq!(
            config.selection.path_aliases.get("/wp-profiling/").map(String::as_str),
            Some("/wp-profiling/index.php")
        );
        assert_eq!(config.refresh.request_threshold, 10_000);
    }
}

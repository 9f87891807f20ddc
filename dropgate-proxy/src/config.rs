//! Host configuration: listener, logging, back-end pool and the gate itself.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{ensure, Context};
use dropgate_core::GateConfig;
use serde::Deserialize;

/// Everything the proxy reads from its YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the HTTP front end binds to.
    pub listen: SocketAddr,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Back-end servers, in configuration order.
    pub backends: Vec<BackendConfig>,
    /// Whitelist, lock and selection settings.
    #[serde(flatten)]
    pub gate: GateConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_filter: "info".to_string(),
            backends: Vec::new(),
            gate: GateConfig::default(),
        }
    }
}

/// One back-end server.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Identifier; its last character is the server's whitelist token.
    pub id: String,
    /// Where the server listens.
    pub address: SocketAddr,
    /// Relative capacity used by the ranking.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Connection limit; zero means unlimited.
    #[serde(default)]
    pub max_conn: u32,
    /// Extra queue slots on top of `max_conn`.
    #[serde(default)]
    pub max_queue: u32,
    /// Only used when no active server is configured.
    #[serde(default)]
    pub backup: bool,
}

fn default_weight() -> u32 {
    1
}

impl ProxyConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: ProxyConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.gate.validate()?;
        ensure!(!self.backends.is_empty(), "at least one backend must be configured");

        let mut seen = HashSet::new();
        for backend in &self.backends {
            ensure!(!backend.id.is_empty(), "backend ids must not be empty");
            ensure!(seen.insert(backend.id.as_str()), "duplicate backend id `{}`", backend.id);
            ensure!(backend.weight > 0, "backend `{}` has zero weight", backend.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
listen: 127.0.0.1:9000
lock:
  host: coordinator
  request_timeout_ms: 500
whitelist:
  path: /tmp/whitelist.csv
  capacity: 128
selection:
  enforce_permitted: true
backends:
  - id: web1
    address: 10.0.0.1:80
  - id: web2
    address: 10.0.0.2:80
    weight: 3
    max_conn: 100
  - id: spare9
    address: 10.0.0.9:80
    backup: true
"#;

    #[test]
    fn parses_sample_config() {
        let config = ProxyConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.gate.lock.host, "coordinator");
        assert_eq!(config.gate.lock.port, 8080);
        assert_eq!(config.gate.whitelist.capacity, 128);
        assert!(config.gate.selection.enforce_permitted);
        assert_eq!(config.gate.refresh.request_threshold, 10_000);

        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.backends[0].weight, 1);
        assert_eq!(config.backends[1].max_conn, 100);
        assert!(config.backends[2].backup);
    }

    #[test]
    fn rejects_duplicate_backends() {
        let yaml = "backends:\n  - {id: web1, address: \"10.0.0.1:80\"}\n  - {id: web1, address: \"10.0.0.2:80\"}\n";
        let err = ProxyConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate backend id"));
    }

    #[test]
    fn rejects_invalid_gate_settings() {
        let yaml = "whitelist:\n  capacity: 0\nbackends:\n  - {id: web1, address: \"10.0.0.1:80\"}\n";
        assert!(ProxyConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn requires_backends() {
        assert!(ProxyConfig::from_yaml("listen: 127.0.0.1:9000\n").is_err());
    }
}

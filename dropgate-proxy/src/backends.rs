//! Back-end server models and the least-loaded ranking.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dropgate_core::Candidate;

use crate::config::BackendConfig;

/// Fixed-point scale for load ratios, so integer division keeps precision.
const LOAD_SCALE: u64 = 256;

/// Represents a single upstream backend server
#[derive(Debug)]
pub struct Backend {
    /// The configured id of the backend
    pub id: String,
    /// The socket address of the backend
    pub addr: SocketAddr,
    /// Relative capacity used by the ranking
    pub weight: u32,
    /// Connection limit, zero for unlimited
    pub max_conn: u32,
    /// Queue slots on top of `max_conn`
    pub max_queue: u32,
    /// Whether the backend only serves when no active backend exists
    pub backup: bool,
    /// Requests currently routed to this backend
    served: AtomicU32,
}

impl Backend {
    /// Create an idle backend from its configuration
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            id: config.id.clone(),
            addr: config.address,
            weight: config.weight,
            max_conn: config.max_conn,
            max_queue: config.max_queue,
            backup: config.backup,
            served: AtomicU32::new(0),
        }
    }

    /// Requests currently routed to this backend
    pub fn served(&self) -> u32 {
        self.served.load(Ordering::Relaxed)
    }

    /// Count a request against this backend until the returned guard drops.
    pub fn begin_request(self: &Arc<Self>) -> InFlightGuard {
        self.served.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            backend: Arc::clone(self),
        }
    }

    /// Load divided by weight; lower ranks first.
    fn load_ratio(&self) -> u64 {
        u64::from(self.served()) * LOAD_SCALE / u64::from(self.weight.max(1))
    }
}

impl Candidate for Backend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_saturated(&self) -> bool {
        self.max_conn != 0 && self.served() >= self.max_conn.saturating_add(self.max_queue)
    }
}

/// A thread-safe reference to a Backend.
pub type SharedBackend = Arc<Backend>;

/// A RAII guard that decrements the backend's in-flight count when the
/// request it was issued for finishes.
#[derive(Debug)]
pub struct InFlightGuard {
    backend: SharedBackend,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.served.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The configured backends.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<SharedBackend>,
}

impl BackendPool {
    /// Build the pool in configuration order.
    pub fn from_config(configs: &[BackendConfig]) -> Self {
        Self {
            backends: configs.iter().map(|c| Arc::new(Backend::new(c))).collect(),
        }
    }

    /// Candidates for the next request, least loaded first.
    ///
    /// Backups are only offered when no active backend is configured. Ties
    /// keep configuration order. Load only counts requests whose decision is
    /// still being answered, so under light traffic most backends sit at
    /// zero and the ranking falls back to configuration order.
    pub fn ranked(&self) -> Vec<SharedBackend> {
        let has_active = self.backends.iter().any(|b| !b.backup);
        let mut ranked: Vec<SharedBackend> = self
            .backends
            .iter()
            .filter(|b| b.backup != has_active)
            .cloned()
            .collect();
        ranked.sort_by_key(|b| b.load_ratio());
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(id: &str, weight: u32, backup: bool) -> BackendConfig {
        BackendConfig {
            id: id.to_string(),
            address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            weight,
            max_conn: 0,
            max_queue: 0,
            backup,
        }
    }

    fn ids(ranked: &[SharedBackend]) -> Vec<&str> {
        ranked.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn ranks_by_weighted_load() {
        let pool = BackendPool::from_config(&[
            backend("web1", 1, false),
            backend("web2", 4, false),
            backend("web3", 1, false),
        ]);
        assert_eq!(ids(&pool.ranked()), vec!["web1", "web2", "web3"]);

        let ranked = pool.ranked();
        let _a = ranked[0].begin_request();
        let _b = ranked[1].begin_request();
        // web1: 1/1, web2: 1/4, web3: 0/1
        assert_eq!(ids(&pool.ranked()), vec!["web3", "web2", "web1"]);
    }

    #[test]
    fn backups_only_without_active_servers() {
        let pool = BackendPool::from_config(&[backend("web1", 1, false), backend("spare9", 1, true)]);
        assert_eq!(ids(&pool.ranked()), vec!["web1"]);

        let backups_only = BackendPool::from_config(&[backend("spare9", 1, true)]);
        assert_eq!(ids(&backups_only.ranked()), vec!["spare9"]);
    }

    #[test]
    fn guard_releases_on_drop() {
        let pool = BackendPool::from_config(&[BackendConfig {
            max_conn: 1,
            ..backend("web1", 1, false)
        }]);
        let web1 = Arc::clone(&pool.ranked()[0]);
        {
            let _guard = web1.begin_request();
            assert_eq!(web1.served(), 1);
            assert!(web1.is_saturated());
        }
        assert_eq!(web1.served(), 0);
        assert!(!web1.is_saturated());
    }
}

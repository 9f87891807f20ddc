//! Dropgate Core functionality.
//!
//! This crate contains the whitelist cache, the coordination-service lock
//! client and the selection filter that a load balancer consults before it
//! dispatches a request to a back-end server.
//!
//! A host wires the pieces together once at start-up:
//!
//! - a [`WhitelistStore`] that lookups read without blocking,
//! - a [`RefreshScheduler`] ticked by every selection,
//! - a [`WhitelistRefresher`] owning the [`LockClient`], run by
//!   [`spawn_refresher`],
//! - a [`SelectionFilter`] called once per request.

pub mod clock;
pub mod config;
pub mod domain;
pub mod load_balancer;
pub mod lock;
pub mod refresh;
pub mod whitelist;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GateConfig};
pub use domain::candidate::{Candidate, CandidateServer, ServerToken};
pub use domain::key::RequestKey;
pub use load_balancer::SelectionFilter;
pub use lock::{LockClient, LockError, LockState};
pub use refresh::{spawn_refresher, RefreshError, RefreshScheduler, RefreshStats, WhitelistRefresher};
pub use whitelist::{PermittedServers, RefreshReport, WhitelistStore};

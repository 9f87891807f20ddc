//! Deciding when to reload the whitelist, and reloading it.

pub mod refresher;
pub mod scheduler;

pub use refresher::{spawn_refresher, RefreshError, RefreshStats, WhitelistRefresher};
pub use scheduler::{RefreshScheduler, SharedRefreshScheduler};

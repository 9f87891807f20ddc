//! The whitelist cache: permitted-server sets keyed by canonical request key.

pub mod permitted;
pub mod snapshot;
pub mod source;
pub mod store;

pub use permitted::{PermittedServers, BLOCK_ALL};
pub use snapshot::{DropReason, WhitelistEntry, WhitelistSnapshot};
pub use source::{parse_whitelist, read_whitelist, ParsedSource, SourceError, WhitelistRow};
pub use store::{DroppedRow, RefreshReport, SharedWhitelistStore, WhitelistStore};

//! The published whitelist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, trace, warn};

use crate::config::WhitelistConfig;
use crate::domain::key::NO_QUERY;
use crate::whitelist::permitted::PermittedServers;
use crate::whitelist::snapshot::{DropReason, Inserted, SnapshotBuilder, WhitelistSnapshot};
use crate::whitelist::source::WhitelistRow;

/// A row left out of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    /// The row's canonical key, even when it was too long to store.
    pub key: String,
    /// Why it was left out.
    pub reason: DropReason,
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Generation of the snapshot that was published.
    pub generation: u64,
    /// Rows offered to the table.
    pub rows: usize,
    /// Entries in the published snapshot.
    pub entries: usize,
    /// Rows that overwrote an earlier row with the same key.
    pub replaced: usize,
    /// Lines of the source file that could not be parsed.
    pub malformed: usize,
    /// Rows that did not fit, in file order.
    pub dropped: Vec<DroppedRow>,
}

/// A lock-free whitelist mapping request keys to permitted servers.
///
/// Lookups read whichever snapshot is published at that moment through
/// `ArcSwap`; a refresh builds a complete replacement off to the side and
/// publishes it with a single store. A lookup therefore never sees a table
/// that mixes old and new rows.
#[derive(Debug)]
pub struct WhitelistStore {
    current: ArcSwap<WhitelistSnapshot>,
    capacity: usize,
    max_bucket_depth: usize,
    max_key_len: usize,
    path_aliases: HashMap<String, String>,
    generation: AtomicU64,
}

impl WhitelistStore {
    /// Create an empty store shaped by `config`.
    pub fn new(config: &WhitelistConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(WhitelistSnapshot::empty(config.capacity)),
            capacity: config.capacity,
            max_bucket_depth: config.max_bucket_depth,
            max_key_len: config.max_key_len,
            path_aliases: HashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Rewrite row paths through `aliases` before keys are built, so a row
    /// written under an aliased path lands on the key requests produce.
    pub fn with_path_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.path_aliases = aliases;
        self
    }

    /// Permitted servers for `key`, or `None` when the key has no entry.
    pub fn lookup(&self, key: &str) -> Option<PermittedServers> {
        self.current.load().get(key).cloned()
    }

    /// Build a new snapshot from `rows` and publish it.
    ///
    /// Rows that do not fit are reported in [`RefreshReport::dropped`]; they
    /// never displace rows already accepted in the same pass.
    pub fn refresh<I>(&self, rows: I) -> RefreshReport
    where
        I: IntoIterator<Item = WhitelistRow>,
    {
        let mut builder = SnapshotBuilder::new(self.capacity, self.max_bucket_depth);
        let mut report = RefreshReport::default();

        for mut row in rows {
            report.rows += 1;
            if let Some(alias) = self.path_aliases.get(&row.path) {
                row.path = alias.clone();
            }
            let key = match row.key(self.max_key_len) {
                Ok(key) => key.into_string(),
                Err(err) => {
                    let key = format!(
                        "{}{}{}",
                        row.method,
                        row.path,
                        row.query.as_deref().unwrap_or(NO_QUERY)
                    );
                    warn!(%key, %err, "whitelist row dropped");
                    report.dropped.push(DroppedRow {
                        key,
                        reason: DropReason::KeyTooLong,
                    });
                    continue;
                }
            };

            match builder.insert(key.clone(), row.servers) {
                Ok(Inserted::New) => {}
                Ok(Inserted::Replaced) => report.replaced += 1,
                Err(reason) => {
                    warn!(%key, ?reason, "whitelist row dropped");
                    report.dropped.push(DroppedRow { key, reason });
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = builder.build(generation);
        report.generation = generation;
        report.entries = snapshot.len();

        for (slot, entry) in snapshot.iter() {
            trace!(generation, slot, key = entry.key(), servers = %entry.permitted(), "whitelist entry");
        }

        self.current.store(Arc::new(snapshot));
        info!(
            generation,
            entries = report.entries,
            dropped = report.dropped.len(),
            "whitelist snapshot published"
        );
        report
    }

    /// The snapshot currently served to lookups.
    pub fn snapshot(&self) -> Arc<WhitelistSnapshot> {
        self.current.load_full()
    }

    /// Longest key the store will accept.
    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }
}

/// A shared reference to the whitelist store.
pub type SharedWhitelistStore = Arc<WhitelistStore>;

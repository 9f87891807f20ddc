//! Background task that reloads the whitelist under the remote lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lock::{LockClient, LockError};
use crate::refresh::scheduler::RefreshScheduler;
use crate::whitelist::{parse_whitelist, read_whitelist, RefreshReport, SharedWhitelistStore, SourceError};

/// A refresh that left the published snapshot untouched.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The lock could not be obtained.
    #[error("whitelist lock unavailable: {0}")]
    Lock(#[from] LockError),
    /// The file could not be read while holding the lock.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Running totals kept by the refresher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Refreshes started.
    pub attempted: u64,
    /// Refreshes that published a snapshot.
    pub succeeded: u64,
    /// Refreshes aborted before publishing.
    pub failed: u64,
    /// Report of the last published snapshot.
    pub last_report: Option<RefreshReport>,
}

/// Owns the lock session and performs refreshes one at a time.
#[derive(Debug)]
pub struct WhitelistRefresher {
    store: SharedWhitelistStore,
    lock: LockClient,
    path: PathBuf,
    stats: RefreshStats,
}

impl WhitelistRefresher {
    /// A refresher publishing into `store` from the file at `path`.
    pub fn new(store: SharedWhitelistStore, lock: LockClient, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            lock,
            path: path.into(),
            stats: RefreshStats::default(),
        }
    }

    /// Read the file under the lock and publish a new snapshot.
    ///
    /// On error the previous snapshot stays in effect.
    pub async fn refresh_once(&mut self) -> Result<RefreshReport, RefreshError> {
        self.stats.attempted += 1;

        let path: &Path = &self.path;
        let read = self.lock.with_lock(|| read_whitelist(path)).await;
        let text = match read {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return Err(self.fail(err.into())),
            Err(err) => return Err(self.fail(err.into())),
        };

        let parsed = parse_whitelist(&text);
        for row in &parsed.malformed {
            warn!(line = row.line, reason = ?row.reason, "skipping malformed whitelist row");
        }
        let mut report = self.store.refresh(parsed.rows);
        report.malformed = parsed.malformed.len();

        self.stats.succeeded += 1;
        self.stats.last_report = Some(report.clone());
        Ok(report)
    }

    /// Totals since construction.
    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// The lock session.
    pub fn lock(&self) -> &LockClient {
        &self.lock
    }

    fn fail(&mut self, err: RefreshError) -> RefreshError {
        self.stats.failed += 1;
        warn!(%err, "whitelist refresh aborted, keeping previous snapshot");
        err
    }
}

/// Run `refresher` whenever `scheduler` triggers, until `shutdown` flips to
/// `true` or its sender is dropped. The task hands the refresher back when it
/// ends.
pub fn spawn_refresher(
    mut refresher: WhitelistRefresher,
    scheduler: Arc<RefreshScheduler>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<WhitelistRefresher> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = scheduler.triggered() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // Errors are already logged and counted by the refresher.
            let _ = refresher.refresh_once().await;
            scheduler.complete();
        }

        info!(stats = ?refresher.stats(), "whitelist refresher stopped");
        refresher
    })
}

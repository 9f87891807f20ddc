//! Whitelist-aware server selection.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::SelectionConfig;
use crate::domain::candidate::{Candidate, ServerToken};
use crate::domain::key::{split_uri, KeyError, RequestKey};
use crate::refresh::RefreshScheduler;
use crate::whitelist::{PermittedServers, SharedWhitelistStore, BLOCK_ALL};

/// Log target for dispatch decisions.
pub const DISPATCH_TARGET: &str = "dropgate::dispatch";

/// Turns a ranked candidate sequence and a whitelist lookup into one server.
///
/// Candidates are scanned in the order the ranking supplied them. The first
/// one that is not saturated wins, unless it is the server the caller asked
/// to avoid; an avoided server is still chosen at once when the whitelist
/// explicitly permits it, and otherwise only when nothing else is left.
#[derive(Debug)]
pub struct SelectionFilter {
    store: SharedWhitelistStore,
    scheduler: Arc<RefreshScheduler>,
    path_aliases: HashMap<String, String>,
    token_aliases: HashMap<String, ServerToken>,
    enforce_permitted: bool,
}

impl SelectionFilter {
    /// Build a filter over `store`, ticking `scheduler` on every selection.
    pub fn new(
        store: SharedWhitelistStore,
        scheduler: Arc<RefreshScheduler>,
        config: &SelectionConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            path_aliases: config.path_aliases.clone(),
            token_aliases: config.token_aliases.clone(),
            enforce_permitted: config.enforce_permitted,
        }
    }

    /// The canonical key for a request.
    pub fn request_key(&self, method: &str, uri: &str) -> Result<RequestKey, KeyError> {
        let (path, query) = split_uri(uri);
        let path = self
            .path_aliases
            .get(path)
            .map(String::as_str)
            .unwrap_or(path);
        RequestKey::from_parts(method, path, query, self.store.max_key_len())
    }

    /// The whitelist token for a server id.
    pub fn token_for(&self, id: &str) -> ServerToken {
        if let Some(token) = self.token_aliases.get(id) {
            return *token;
        }
        id.chars().last().unwrap_or(BLOCK_ALL)
    }

    /// Pick a server for `method uri` from `candidates`, least loaded first.
    ///
    /// `avoid` names a server that already failed this request. Returns
    /// `None` when the whitelist blocks the request or no candidate is usable.
    pub fn select_server<'a, C, I>(
        &self,
        method: &str,
        uri: &str,
        candidates: I,
        avoid: Option<&str>,
    ) -> Option<&'a C>
    where
        C: Candidate + ?Sized + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        self.scheduler.tick();

        let key = match self.request_key(method, uri) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!(method, %err, "request key rejected, treating request as unrestricted");
                None
            }
        };
        let servers = key.as_ref().and_then(|key| self.store.lookup(key.as_str()));

        if servers.as_ref().is_some_and(PermittedServers::blocks_all) {
            log_dispatch(key.as_ref(), servers.as_ref(), None);
            return None;
        }

        let mut avoided = None;
        let mut chosen = None;
        for candidate in candidates {
            if candidate.is_saturated() {
                continue;
            }

            let token = self.token_for(candidate.id());
            let permitted = servers.as_ref().is_some_and(|servers| servers.contains(token));
            if self.enforce_permitted && servers.is_some() && !permitted {
                continue;
            }

            let is_avoided = avoid.is_some_and(|avoid| avoid == candidate.id());
            if !is_avoided || permitted {
                chosen = Some((candidate, token));
                break;
            }
            if avoided.is_none() {
                avoided = Some((candidate, token));
            }
        }

        let chosen = chosen.or(avoided);
        log_dispatch(key.as_ref(), servers.as_ref(), chosen.map(|(_, token)| token));
        chosen.map(|(candidate, _)| candidate)
    }
}

fn log_dispatch(
    key: Option<&RequestKey>,
    servers: Option<&PermittedServers>,
    token: Option<ServerToken>,
) {
    debug!(
        target: DISPATCH_TARGET,
        key = key.map(RequestKey::as_str),
        servers = servers.map(PermittedServers::as_str),
        token = ?token,
        "dispatch"
    );
}

//! Candidate server models.
//!
//! The host's ranking structure hands the gate an ordered sequence of
//! candidates (least loaded first). The gate only reads them.

use std::sync::Arc;

/// The single-character token a server is known by in the whitelist.
pub type ServerToken = char;

/// What the selection filter needs to know about a ranked server.
pub trait Candidate {
    /// The server's configured identifier.
    fn id(&self) -> &str;

    /// Whether in-flight plus queued work has reached the server's capacity.
    fn is_saturated(&self) -> bool;
}

/// A plain snapshot of one back-end server's load and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateServer {
    /// The server's identifier.
    pub id: String,
    /// Requests currently being served.
    pub served: u32,
    /// Requests waiting in the server's queue.
    pub queued: u32,
    /// Dynamic connection limit; zero means unlimited.
    pub max_conn: u32,
    /// Additional queue slots allowed on top of `max_conn`.
    pub max_queue: u32,
    /// Relative weight used by the ranking.
    pub weight: u32,
    /// Whether this is a backup server.
    pub backup: bool,
    /// Whether the host currently considers the server reachable.
    pub reachable: bool,
}

impl CandidateServer {
    /// An idle, unlimited, active server with weight 1.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            served: 0,
            queued: 0,
            max_conn: 0,
            max_queue: 0,
            weight: 1,
            backup: false,
            reachable: true,
        }
    }

    /// Set the current load.
    pub fn with_load(mut self, served: u32, queued: u32) -> Self {
        self.served = served;
        self.queued = queued;
        self
    }

    /// Set the connection and queue limits.
    pub fn with_limits(mut self, max_conn: u32, max_queue: u32) -> Self {
        self.max_conn = max_conn;
        self.max_queue = max_queue;
        self
    }

    /// In-flight plus queued work.
    pub fn load(&self) -> u64 {
        u64::from(self.served) + u64::from(self.queued)
    }
}

impl Candidate for CandidateServer {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_saturated(&self) -> bool {
        self.max_conn != 0
            && self.load() >= u64::from(self.max_conn) + u64::from(self.max_queue)
    }
}

impl<C: Candidate + ?Sized> Candidate for Arc<C> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn is_saturated(&self) -> bool {
        (**self).is_saturated()
    }
}

//! Message id allocation and request/response correlation.
//!
//! # What is a message id? (for beginners)
//!
//! Every Blynk frame carries a 16-bit *message id*.  When the client sends a
//! request that expects an answer (LOGIN, PING), the server replies with a
//! RESPONSE frame carrying the *same* id.  Because other traffic may arrive
//! between the request and its answer, the id (not arrival order) is what
//! ties them together.
//!
//! The [`MessageCorrelator`] hands out ids and remembers which ones are
//! still waiting for an answer:
//!
//! - Ids count up from 1 and wrap from `u16::MAX` back to 1.  Id 0 is
//!   reserved and never issued.
//! - An id that is still outstanding is skipped, so after wraparound two
//!   in-flight requests can never share an id.
//! - [`sweep`](MessageCorrelator::sweep) expires requests that waited too
//!   long, which keeps the pending set bounded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The kind of request awaiting a RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Login,
    Ping,
}

/// A request that has been sent and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub message_id: u16,
    pub issued_at: Instant,
    pub kind: RequestKind,
}

/// Allocates message ids and matches RESPONSE frames to pending requests.
#[derive(Debug)]
pub struct MessageCorrelator {
    /// The id the next call to `allocate_id` will try first.
    next_id: u16,
    pending: HashMap<u16, PendingRequest>,
    login_deadline: Duration,
    ping_deadline: Duration,
}

impl MessageCorrelator {
    /// Creates a correlator.  Login and ping requests older than their
    /// respective deadline are reported by [`sweep`](Self::sweep).
    pub fn new(login_deadline: Duration, ping_deadline: Duration) -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            login_deadline,
            ping_deadline,
        }
    }

    /// Returns the next free message id.
    ///
    /// Ids increase monotonically, wrap from `u16::MAX` to 1, never return 0,
    /// and skip ids that are still pending.
    pub fn allocate_id(&mut self) -> u16 {
        for _ in 0..u16::MAX {
            let candidate = self.next_id;
            self.next_id = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.pending.contains_key(&candidate) {
                return candidate;
            }
        }
        // Unreachable while sweep keeps the pending set small.
        warn!("all message ids are pending; reusing {}", self.next_id);
        self.next_id
    }

    /// Records that a request with `message_id` was sent at `now`.
    pub fn register(&mut self, message_id: u16, kind: RequestKind, now: Instant) {
        let replaced = self.pending.insert(
            message_id,
            PendingRequest {
                message_id,
                issued_at: now,
                kind,
            },
        );
        if let Some(old) = replaced {
            warn!("message id {message_id} re-registered; dropping pending {:?}", old.kind);
        }
    }

    /// Removes and returns the pending request with `message_id`.
    ///
    /// `None` is not an error: the server may answer frames the client does
    /// not track, or retransmit an answer that was already matched.
    pub fn resolve(&mut self, message_id: u16) -> Option<PendingRequest> {
        self.pending.remove(&message_id)
    }

    /// Removes and returns every request whose deadline has passed at `now`,
    /// oldest first.
    pub fn sweep(&mut self, now: Instant) -> Vec<PendingRequest> {
        let (login_deadline, ping_deadline) = (self.login_deadline, self.ping_deadline);
        let expired_ids: Vec<u16> = self
            .pending
            .values()
            .filter(|p| {
                let deadline = match p.kind {
                    RequestKind::Login => login_deadline,
                    RequestKind::Ping => ping_deadline,
                };
                now.saturating_duration_since(p.issued_at) >= deadline
            })
            .map(|p| p.message_id)
            .collect();

        let mut expired: Vec<PendingRequest> = expired_ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect();
        expired.sort_by_key(|p| p.issued_at);

        if !expired.is_empty() {
            debug!("{} pending request(s) timed out", expired.len());
        }
        expired
    }

    /// Drops all pending requests and restarts ids at 1.
    ///
    /// Called when a session ends; the next LOGIN therefore uses id 1.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_id = 1;
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if a request of `kind` is outstanding.
    pub fn has_pending(&self, kind: RequestKind) -> bool {
        self.pending.values().any(|p| p.kind == kind)
    }
}

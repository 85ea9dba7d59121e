//! Outstanding remote-select request table
//!
//! Every select we send registers an entry keyed by `(peer, request id)`;
//! inbound responses consume budget from the matching entry and everything
//! else is treated as unsolicited. Entries die three ways: the response
//! budget reaches zero, a response arrives after the deadline, or the
//! periodic eviction sweep finds them expired. The sweep is what bounds
//! memory when a peer never answers at all.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::store::SelectFilter;
use crate::types::PeerId;

/// A select request awaiting response chunks
#[derive(Debug, Clone)]
pub struct OutstandingRequest {
    /// The filter the request was sent with
    pub filter: SelectFilter,
    /// Response chunks this entry will still accept
    pub budget: u32,
    /// Instant after which responses are rejected
    pub deadline: Instant,
}

/// Table of outstanding select requests, keyed by `(peer, id)`
///
/// Owns all mutation of request state; callers hold it behind a lock and
/// pass `now` explicitly so expiry logic stays deterministic.
#[derive(Debug, Default)]
pub struct OutstandingTable {
    entries: HashMap<(PeerId, u32), OutstandingRequest>,
}

impl OutstandingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request
    ///
    /// Request ids are 32-bit uniform random and not de-duplicated; on the
    /// rare collision with a live entry for the same peer, the stale entry
    /// is replaced.
    pub fn insert(
        &mut self,
        peer: PeerId,
        id: u32,
        filter: SelectFilter,
        budget: u32,
        timeout: Duration,
        now: Instant,
    ) {
        self.entries.insert(
            (peer, id),
            OutstandingRequest {
                filter,
                budget,
                deadline: now + timeout,
            },
        );
    }

    /// Consume one unit of response budget for `(peer, id)`
    ///
    /// Returns the request's filter when the response should be processed.
    /// Returns `None` for unknown entries (already exhausted, evicted, or
    /// never ours), and for expired entries, which are removed on the spot.
    /// The entry is removed once its last budget unit is consumed, so later
    /// responses for the same id are no-ops.
    pub fn consume_one(&mut self, peer: &PeerId, id: u32, now: Instant) -> Option<SelectFilter> {
        let key = (*peer, id);
        let entry = self.entries.get_mut(&key)?;

        if now > entry.deadline {
            self.entries.remove(&key);
            return None;
        }

        if entry.budget > 1 {
            entry.budget -= 1;
            Some(entry.filter.clone())
        } else {
            self.entries.remove(&key).map(|e| e.filter)
        }
    }

    /// Remove an entry outright, regardless of budget or deadline
    pub fn remove(&mut self, peer: &PeerId, id: u32) -> Option<OutstandingRequest> {
        self.entries.remove(&(*peer, id))
    }

    /// Drop every entry whose deadline has passed
    ///
    /// Returns how many entries were evicted.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.deadline);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

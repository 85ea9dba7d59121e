//! Remote metadata queries against peer stores
//!
//! The [`QueryCoordinator`] owns both sides of the select protocol: it
//! issues requests (tracking them in an [`OutstandingTable`]) and answers
//! peer requests by streaming byte-budgeted chunks. Responses are bounded
//! twice over: a per-request packet budget stops a malicious peer from
//! flooding unbounded chunks under one id, and a timeout plus periodic
//! eviction bounds memory when peers stay silent.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::overlay::PeerOverlay;
use crate::store::{MetadataStore, SelectFilter};
use crate::sync::chunk::records_to_chunk;
use crate::sync::outstanding::OutstandingTable;
use crate::sync::protocol::WireMessage;
use crate::sync::SyncSettings;
use crate::types::PeerId;

/// Issues and answers remote metadata selects
pub struct QueryCoordinator {
    overlay: Arc<dyn PeerOverlay>,
    store: Arc<dyn MetadataStore>,
    settings: SyncSettings,
    outstanding: Mutex<OutstandingTable>,
    /// Serializes store imports with the other sync subsystems
    write_gate: Arc<AsyncMutex<()>>,
}

impl QueryCoordinator {
    pub fn new(
        overlay: Arc<dyn PeerOverlay>,
        store: Arc<dyn MetadataStore>,
        settings: SyncSettings,
        write_gate: Arc<AsyncMutex<()>>,
    ) -> Self {
        Self {
            overlay,
            store,
            settings,
            outstanding: Mutex::new(OutstandingTable::new()),
            write_gate,
        }
    }

    /// Send a select request to one peer
    ///
    /// Registers the outstanding entry before sending so a response racing
    /// the send cannot be treated as unsolicited. Returns the request id.
    pub fn send_select(&self, peer: PeerId, filter: SelectFilter) -> SyncResult<u32> {
        let id: u32 = rand::random();
        let query = serde_json::to_vec(&filter)?;

        self.outstanding.lock().insert(
            peer,
            id,
            filter,
            self.settings.packets_limit,
            self.settings.request_timeout,
            Instant::now(),
        );

        debug!(%peer, id, "Sending remote select");
        if let Err(e) = self
            .overlay
            .send(&peer, WireMessage::SelectRequest { id, query })
        {
            // The request never left; don't leave its entry to time out.
            self.outstanding.lock().remove(&peer, id);
            return Err(e);
        }
        Ok(id)
    }

    /// Send a select to a uniform random sample of known peers
    ///
    /// Samples without replacement, up to `max_query_peers`; fewer known
    /// peers means all of them are queried. Per-peer send failures are
    /// logged and do not stop the remaining sends. Returns how many peers
    /// were queried.
    pub fn broadcast_select(&self, filter: &SelectFilter) -> usize {
        let peers = self.overlay.peers();
        let selected: Vec<PeerId> = {
            let mut rng = rand::rng();
            peers
                .choose_multiple(&mut rng, self.settings.max_query_peers)
                .copied()
                .collect()
        };

        let mut sent = 0;
        for peer in selected {
            match self.send_select(peer, filter.clone()) {
                Ok(_) => sent += 1,
                Err(e) => warn!(%peer, error = %e, "Failed to send select"),
            }
        }
        sent
    }

    /// Ask one peer for all channels it subscribes to
    ///
    /// Responses to this query also credit the peer as a popularity voter
    /// for the returned channels.
    pub fn request_subscribed_channels(&self, peer: PeerId) -> SyncResult<u32> {
        self.send_select(peer, SelectFilter::subscribed_channels())
    }

    /// Answer a peer's select request
    ///
    /// The store query runs on the blocking pool. An empty result set sends
    /// nothing; otherwise records are greedily packed into chunks of at most
    /// `max_payload_size` bytes, each sent as an independent response
    /// echoing the request id. Malformed queries are dropped without reply.
    pub async fn handle_select_request(
        &self,
        peer: PeerId,
        id: u32,
        query: &[u8],
    ) -> SyncResult<()> {
        let filter: SelectFilter = match serde_json::from_slice(query) {
            Ok(filter) => filter,
            Err(e) => {
                debug!(%peer, id, error = %e, "Dropping malformed select request");
                return Ok(());
            }
        };

        let store = Arc::clone(&self.store);
        let records = task::spawn_blocking(move || store.query(&filter)).await??;
        if records.is_empty() {
            return Ok(());
        }

        debug!(%peer, id, records = records.len(), "Answering remote select");
        let mut index = 0;
        while index < records.len() {
            let (payload, next) =
                records_to_chunk(&records, self.settings.max_payload_size, index)?;
            self.overlay
                .send(&peer, WireMessage::SelectResponse { id, payload })?;
            index = next;
        }
        Ok(())
    }

    /// Fold a response chunk back into the store
    ///
    /// Responses without a live `(peer, id)` entry — exhausted, evicted, or
    /// plain unsolicited — are silently discarded. Accepted chunks are
    /// imported under the write gate; when the original query asked for
    /// subscribed channels only, the responding peer is credited as a
    /// popularity voter for the imported records.
    pub async fn handle_select_response(
        &self,
        peer: PeerId,
        id: u32,
        payload: Vec<u8>,
    ) -> SyncResult<()> {
        let filter = self.outstanding.lock().consume_one(&peer, id, Instant::now());
        let Some(filter) = filter else {
            debug!(%peer, id, "Dropping response with no live request");
            return Ok(());
        };

        let voter = (filter.subscribed == Some(true)).then_some(peer);
        let store = Arc::clone(&self.store);
        let _gate = self.write_gate.lock().await;
        let imported = task::spawn_blocking(move || store.import_blob(&payload, voter)).await??;
        debug!(%peer, id, imported, "Imported select response chunk");
        Ok(())
    }

    /// Evict every outstanding request past its deadline
    ///
    /// Runs periodically so entries die even when no response ever arrives.
    pub fn evict_timed_out(&self) -> usize {
        let evicted = self.outstanding.lock().evict_expired(Instant::now());
        if evicted > 0 {
            debug!(evicted, "Evicted timed out select requests");
        }
        evicted
    }

    /// Number of live outstanding requests
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.lock().len()
    }
}

//! Channel synchronization layer
//!
//! Three always-running subsystems keep the local store consistent with a
//! swarm of untrusted peers under loss and churn:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  SyncManager                                                   │
//! │  ├── QueryCoordinator (remote metadata selects)                │
//! │  │   ├── OutstandingTable: (peer, id) → budget + deadline      │
//! │  │   └── chunk packing for outbound responses                  │
//! │  ├── HealthGossip (epidemic torrent-health dissemination)      │
//! │  └── ChannelReconciler (subscription vs. download state)       │
//! │      ├── cruft removal / update check sweep                    │
//! │      ├── completion handling (at-most-once import)             │
//! │      └── personal-channel publication with bounded retry       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All message handlers and periodic drivers are async tasks that never
//! block: store work runs on the blocking pool, and writes are serialized
//! per logical unit through a shared write gate. Nothing here assumes
//! delivery or ordering from the transport; resilience is timeout plus
//! eviction, with the single bounded retry of the personal-channel publish
//! as the only acknowledged exception.

pub mod chunk;
pub mod events;
pub mod gossip;
pub mod manager;
pub mod outstanding;
pub mod protocol;
pub mod query;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use events::SyncEvent;
pub use gossip::HealthGossip;
pub use manager::SyncManager;
pub use outstanding::{OutstandingRequest, OutstandingTable};
pub use protocol::WireMessage;
pub use query::QueryCoordinator;
pub use reconciler::ChannelReconciler;

use tokio::time::Duration;

/// Tunables of the sync layer
///
/// Defaults are the protocol constants; embedders normally only override
/// intervals in tests.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Maximum response chunks accepted per select request
    ///
    /// Caps the response volume one request id can ever cost us, no matter
    /// how many chunks a peer keeps sending.
    pub packets_limit: u32,
    /// How long a select request stays live after sending
    pub request_timeout: Duration,
    /// Cadence of the outstanding-table eviction sweep
    pub eviction_interval: Duration,
    /// Upper bound on one response chunk, in bytes
    pub max_payload_size: usize,
    /// Assumed lower bound on one serialized record, in bytes
    pub min_record_size: usize,
    /// Peers queried by one broadcast select
    pub max_query_peers: usize,
    /// Entries per gossip sample list
    pub gossip_sample_size: usize,
    /// Cadence of health gossip publication
    pub publish_interval: Duration,
    /// Cadence of the channel reconciliation sweep
    pub reconcile_interval: Duration,
    /// Delay before the single personal-channel publish retry
    pub publish_retry_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            packets_limit: 10,
            request_timeout: Duration::from_secs(10),
            eviction_interval: Duration::from_secs(1),
            max_payload_size: 1300,
            min_record_size: 200,
            max_query_peers: 5,
            gossip_sample_size: 5,
            publish_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(5),
            publish_retry_delay: Duration::from_secs(7),
        }
    }
}

impl SyncSettings {
    /// Worst-case number of records one chunk can carry
    pub fn max_records_per_chunk(&self) -> usize {
        self.max_payload_size / self.min_record_size
    }
}

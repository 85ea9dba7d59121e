//! Notifications emitted by the sync layer
//!
//! Consumers subscribe through
//! [`SyncManager::subscribe`](crate::sync::SyncManager::subscribe); events
//! are broadcast to all listeners and dropped when nobody listens.

use crate::types::{ChannelKey, InfoHash};

/// Something observable happened in one of the sync subsystems
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A new channel revision started downloading
    ChannelDownloadStarted {
        /// Content hash of the revision being fetched
        infohash: InfoHash,
    },
    /// A completed channel download was imported into the store
    ChannelImported {
        /// Publisher identity the directory was imported under
        public_key: ChannelKey,
        /// Content hash of the imported revision
        infohash: InfoHash,
    },
    /// A download no longer covered by a subscription was removed
    CruftRemoved {
        /// Content hash of the removed download
        infohash: InfoHash,
        /// Whether on-disk files were deleted with it
        removed_files: bool,
    },
    /// Inbound gossip merged fresher health observations
    HealthMerged {
        /// Entries that were fresher than stored state
        accepted: usize,
    },
}

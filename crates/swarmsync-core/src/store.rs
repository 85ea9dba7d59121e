//! Metadata store seam
//!
//! The persistent metadata store is an external collaborator: this crate
//! only defines the contract it consumes. Every method is one transactional
//! unit inside the implementation, but the store is not safe for
//! unsynchronized concurrent mutation — callers serialize logical write
//! units (one blob import or one gossip merge at a time) before invoking it.
//!
//! Implementations may block (database scans, bulk imports); the sync
//! components always call them through the runtime's blocking pool so store
//! work never stalls message dispatch.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::types::{ChannelKey, ChannelRecord, HealthRecord, InfoHash, PeerId};

/// Filter predicates for a metadata SELECT
///
/// This is the structured parameter object carried inside a remote select
/// request, serialized as UTF-8 JSON on the wire. All predicates are
/// conjunctive; an empty filter matches every channel record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectFilter {
    /// Match only the channel published under this key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<ChannelKey>,
    /// Match only the channel with this content hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infohash: Option<InfoHash>,
    /// Match only channels with this subscription state
    ///
    /// Responses to a `subscribed: Some(true)` query additionally count as
    /// popularity votes from the responding peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<bool>,
}

impl SelectFilter {
    /// The canonical "all channels the remote peer subscribes to" query
    pub fn subscribed_channels() -> Self {
        Self {
            subscribed: Some(true),
            ..Self::default()
        }
    }

    /// Lookup of a single channel by content hash
    pub fn by_infohash(infohash: InfoHash) -> Self {
        Self {
            infohash: Some(infohash),
            ..Self::default()
        }
    }

    /// Whether a record satisfies every predicate of this filter
    pub fn matches(&self, record: &ChannelRecord) -> bool {
        if let Some(key) = &self.public_key {
            if record.public_key != *key {
                return false;
            }
        }
        if let Some(hash) = &self.infohash {
            if record.infohash != *hash {
                return false;
            }
        }
        if let Some(subscribed) = self.subscribed {
            if record.subscribed != subscribed {
                return false;
            }
        }
        true
    }
}

/// Contract of the external metadata store
pub trait MetadataStore: Send + Sync {
    /// Run a SELECT against the channel metadata
    fn query(&self, filter: &SelectFilter) -> SyncResult<Vec<ChannelRecord>>;

    /// Subscribed channels with `remote_timestamp > local_version`
    fn updated_channels(&self) -> SyncResult<Vec<ChannelRecord>>;

    /// All channels the local user subscribes to
    fn subscribed_channels(&self) -> SyncResult<Vec<ChannelRecord>>;

    /// The local user's own channel, if one exists
    fn personal_channel(&self) -> SyncResult<Option<ChannelRecord>>;

    /// Import a chunk of serialized channel records
    ///
    /// `voter`, when present, is credited as a popularity vote for every
    /// channel in the blob. Returns the number of records imported.
    fn import_blob(&self, blob: &[u8], voter: Option<PeerId>) -> SyncResult<usize>;

    /// Import a fully downloaded channel directory for the given publisher
    fn import_channel_dir(&self, dir: &Path, channel: &ChannelKey) -> SyncResult<()>;

    /// Current health observation for one torrent, if any
    fn torrent_health(&self, infohash: &InfoHash) -> SyncResult<Option<HealthRecord>>;

    /// Insert or overwrite a health observation
    fn upsert_health(&self, record: &HealthRecord) -> SyncResult<()>;

    /// All torrents with a locally known health observation
    fn checked_torrents(&self) -> SyncResult<Vec<HealthRecord>>;

    /// Unsubscribe a channel: clear its contents and reset `local_version`
    fn reset_channel(&self, channel: &ChannelKey) -> SyncResult<()>;
}

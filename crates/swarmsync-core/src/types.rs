//! Core types for the swarmsync overlay

use serde::{Deserialize, Serialize};

/// Identifier of a peer on the overlay
///
/// Opaque to this crate: the transport derives it from the peer's overlay
/// identity. Used to key outstanding requests and to attribute popularity
/// votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create a PeerId from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the PeerId
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to base58 string for display/storage
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse from base58 string
    pub fn from_base58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        if bytes.len() != 32 {
            return Err(bs58::decode::Error::BufferTooSmall);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer_{}", bs58::encode(&self.0[..8]).into_string())
    }
}

/// Content hash addressing one piece of shareable content
///
/// For a channel this is the infohash of the channel's torrent swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    /// Create an InfoHash from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the InfoHash
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse from a 40-character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    /// Convert to a lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Public key of a channel's publisher
///
/// A channel is addressed by the identity key of the publishing peer; all
/// revisions of a channel share this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey(pub [u8; 32]);

impl ChannelKey {
    /// Create a ChannelKey from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the ChannelKey
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    /// Convert to a lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Publication status of a channel revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    /// The channel has local edits that have not been committed yet
    Draft,
    /// The channel revision is committed and ready to be shared
    Committed,
}

/// Metadata describing one channel as known to the local store
///
/// `local_version` is the last revision fully imported locally;
/// `remote_timestamp` is the latest revision observed anywhere. Once a
/// channel has been imported, `local_version <= remote_timestamp` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Identity key of the publisher
    pub public_key: ChannelKey,
    /// Content hash of the latest known channel torrent
    pub infohash: InfoHash,
    /// Directory name the channel contents unpack into
    pub dir_name: String,
    /// Last revision imported into the local store
    pub local_version: u64,
    /// Latest revision observed from the swarm
    pub remote_timestamp: u64,
    /// Whether the local user subscribes to this channel
    pub subscribed: bool,
    /// Publication status of this revision
    pub status: ChannelStatus,
}

impl ChannelRecord {
    /// Whether a newer revision than the locally imported one is known
    pub fn has_update(&self) -> bool {
        self.remote_timestamp > self.local_version
    }
}

/// Swarm health observation for one torrent
///
/// Records are merged by freshness: an entry only ever replaces a stored one
/// when its `last_check` is strictly greater, independent of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Content hash of the observed torrent
    pub infohash: InfoHash,
    /// Number of seeders at check time
    pub seeders: u32,
    /// Number of leechers at check time
    pub leechers: u32,
    /// Unix timestamp (seconds) of the observation
    pub last_check: u64,
}

impl HealthRecord {
    /// Whether this observation supersedes `other` under freshness merge
    pub fn is_fresher_than(&self, other: &HealthRecord) -> bool {
        self.last_check > other.last_check
    }
}

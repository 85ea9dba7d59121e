//! Peer overlay seam
//!
//! The overlay transport (peer discovery, framing, identity, delivery) is an
//! external collaborator. This crate consumes it through [`PeerOverlay`]:
//! a best-effort, unordered, peer-addressable send plus a view of the
//! currently known peer set. Messages may be dropped, duplicated, or
//! reordered; nothing in the sync core assumes otherwise.
//!
//! Inbound traffic does not go through this trait. The embedder decodes
//! frames into [`WireMessage`]s and feeds them to
//! [`SyncManager::start`](crate::sync::SyncManager::start) as an `mpsc`
//! stream of `(PeerId, WireMessage)` pairs.

use crate::error::SyncResult;
use crate::sync::protocol::WireMessage;
use crate::types::PeerId;

/// Contract of the external overlay transport
pub trait PeerOverlay: Send + Sync {
    /// The currently known peer set
    fn peers(&self) -> Vec<PeerId>;

    /// Send one message to one peer, best effort
    ///
    /// An `Ok` return means the message was handed to the transport, not
    /// that it was delivered.
    fn send(&self, peer: &PeerId, message: WireMessage) -> SyncResult<()>;
}

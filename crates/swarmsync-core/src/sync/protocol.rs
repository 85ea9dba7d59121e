//! Wire messages exchanged between overlay peers
//!
//! Messages are serialized with postcard. Three message types cover the
//! whole protocol:
//!
//! 1. **SelectRequest**: ask a peer to run a metadata query
//! 2. **SelectResponse**: one of possibly several chunks answering a request
//! 3. **TorrentsHealth**: unsolicited periodic health gossip
//!
//! ## Message Flow
//!
//! ```text
//! Requester                        Responder
//!   |                                 |
//!   |--- SelectRequest {id, query} -->|
//!   |                                 |  (run query, pack chunks)
//!   |<-- SelectResponse {id, chunk} --|
//!   |<-- SelectResponse {id, chunk} --|
//!   |        ...up to budget...       |
//!
//! Gossiper                         Random peer
//!   |--- TorrentsHealth {r, p} ------>|   (fire-and-forget)
//! ```
//!
//! The select exchange is receiver-push-until-exhausted: the responder
//! streams chunks without acknowledgment, and the requester bounds what it
//! will accept by both a packet budget and a timeout.

use serde::{Deserialize, Serialize};

use crate::types::HealthRecord;

/// Messages sent between peers of the sync overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Ask the receiving peer to run a metadata query
    SelectRequest {
        /// Random identifier echoed by every response chunk
        id: u32,
        /// UTF-8 JSON encoding of a [`SelectFilter`](crate::store::SelectFilter)
        query: Vec<u8>,
    },

    /// One chunk of serialized records answering a [`WireMessage::SelectRequest`]
    SelectResponse {
        /// Identifier of the request being answered
        id: u32,
        /// Concatenation of postcard-encoded channel records
        payload: Vec<u8>,
    },

    /// Unsolicited periodic push of torrent health observations
    TorrentsHealth {
        /// Uniform random sample of locally checked torrents
        random: Vec<HealthRecord>,
        /// Most-seeded torrents not already in the random sample
        popular: Vec<HealthRecord>,
    },
}

impl WireMessage {
    /// Encode message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}

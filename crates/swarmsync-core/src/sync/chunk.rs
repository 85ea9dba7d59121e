//! Byte-budgeted packing of query results into response chunks
//!
//! A query result set is streamed to the requester as a sequence of chunks,
//! each at most `max_payload_size` bytes. Records are postcard-encoded
//! individually and concatenated, so a record is never split across chunks
//! and the receiver can decode a chunk without knowing how it was cut.
//! Packing is index-resumable: [`records_to_chunk`] returns the index of the
//! first record that did not fit, and the caller continues from there.

use crate::error::{SyncError, SyncResult};
use crate::types::ChannelRecord;

/// Greedily pack records into one chunk, starting at `start`
///
/// Returns the chunk bytes and the index of the first unpacked record.
/// Every call packs at least one record; a single record larger than the
/// payload budget is an error rather than an oversized chunk.
pub fn records_to_chunk(
    records: &[ChannelRecord],
    max_payload_size: usize,
    start: usize,
) -> SyncResult<(Vec<u8>, usize)> {
    let mut chunk = Vec::with_capacity(max_payload_size);
    let mut index = start;

    while index < records.len() {
        let encoded = postcard::to_allocvec(&records[index])?;
        if encoded.len() > max_payload_size {
            return Err(SyncError::RecordTooLarge {
                size: encoded.len(),
                limit: max_payload_size,
            });
        }
        if chunk.len() + encoded.len() > max_payload_size {
            break;
        }
        chunk.extend_from_slice(&encoded);
        index += 1;
    }

    Ok((chunk, index))
}

/// Decode a chunk back into the records it carries
///
/// Iterates `postcard::take_from_bytes` until the payload is exhausted, so
/// trailing garbage or a truncated record surfaces as a decode error.
pub fn chunk_to_records(blob: &[u8]) -> SyncResult<Vec<ChannelRecord>> {
    let mut records = Vec::new();
    let mut rest = blob;
    while !rest.is_empty() {
        let (record, tail) = postcard::take_from_bytes::<ChannelRecord>(rest)?;
        records.push(record);
        rest = tail;
    }
    Ok(records)
}

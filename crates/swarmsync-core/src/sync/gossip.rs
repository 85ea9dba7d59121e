//! Epidemic dissemination of torrent health statistics
//!
//! Every publish interval, one random peer receives a two-list sample of
//! our locally checked torrents: a uniform random slice for diversity and a
//! most-seeded slice for high-value data, together bounding the payload to
//! a fixed size. The exchange is fire-and-forget: no acknowledgment, no
//! retry, no correlation with any request.
//!
//! Inbound observations are merged by freshness: only an entry with a
//! strictly newer `last_check` than the stored one replaces it, so the
//! merge is idempotent and independent of arrival order.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task;
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::overlay::PeerOverlay;
use crate::store::MetadataStore;
use crate::sync::events::SyncEvent;
use crate::sync::protocol::WireMessage;
use crate::sync::SyncSettings;
use crate::types::{HealthRecord, InfoHash, PeerId};

/// Periodically exchanges torrent health with random peers
pub struct HealthGossip {
    overlay: Arc<dyn PeerOverlay>,
    store: Arc<dyn MetadataStore>,
    settings: SyncSettings,
    /// Serializes store writes with the other sync subsystems
    write_gate: Arc<AsyncMutex<()>>,
    events: broadcast::Sender<SyncEvent>,
}

impl HealthGossip {
    pub fn new(
        overlay: Arc<dyn PeerOverlay>,
        store: Arc<dyn MetadataStore>,
        settings: SyncSettings,
        write_gate: Arc<AsyncMutex<()>>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            overlay,
            store,
            settings,
            write_gate,
            events,
        }
    }

    /// Run one gossip publication cycle
    ///
    /// A cycle with no known peers or no local health data is a no-op, not
    /// an error. Otherwise the combined random/popular sample goes to
    /// exactly one uniformly random peer.
    pub async fn publish_cycle(&self) -> SyncResult<()> {
        let peers = self.overlay.peers();
        if peers.is_empty() {
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let checked = task::spawn_blocking(move || store.checked_torrents()).await??;
        if checked.is_empty() {
            return Ok(());
        }

        let sample_size = self.settings.gossip_sample_size;
        let Some((target, random, popular)) = ({
            let mut rng = rand::rng();
            peers.choose(&mut rng).map(|target| {
                let random: Vec<HealthRecord> = checked
                    .choose_multiple(&mut rng, sample_size)
                    .copied()
                    .collect();
                let sampled: HashSet<InfoHash> =
                    random.iter().map(|r| r.infohash).collect();

                let mut popular: Vec<HealthRecord> = checked
                    .iter()
                    .filter(|r| !sampled.contains(&r.infohash))
                    .copied()
                    .collect();
                popular.sort_by(|a, b| b.seeders.cmp(&a.seeders));
                popular.truncate(sample_size);

                (*target, random, popular)
            })
        }) else {
            return Ok(());
        };

        debug!(
            %target,
            random = random.len(),
            popular = popular.len(),
            "Gossiping torrent health"
        );
        self.overlay
            .send(&target, WireMessage::TorrentsHealth { random, popular })
    }

    /// Merge inbound health observations into the store
    ///
    /// Dispatched to the blocking pool under the write gate so merge work
    /// never blocks message dispatch. For every entry across both lists:
    /// strictly fresher than stored wins, otherwise the entry is ignored;
    /// unknown torrents are inserted.
    pub async fn handle_torrents_health(
        &self,
        from: PeerId,
        random: Vec<HealthRecord>,
        popular: Vec<HealthRecord>,
    ) -> SyncResult<()> {
        info!(
            %from,
            random = random.len(),
            popular = popular.len(),
            "Received torrent health gossip"
        );

        let store = Arc::clone(&self.store);
        let _gate = self.write_gate.lock().await;
        let accepted = task::spawn_blocking(move || -> SyncResult<usize> {
            let mut accepted = 0;
            for entry in random.into_iter().chain(popular) {
                match store.torrent_health(&entry.infohash)? {
                    Some(existing) if !entry.is_fresher_than(&existing) => {}
                    _ => {
                        store.upsert_health(&entry)?;
                        accepted += 1;
                    }
                }
            }
            Ok(accepted)
        })
        .await??;

        if accepted > 0 {
            let _ = self.events.send(SyncEvent::HealthMerged { accepted });
        }
        Ok(())
    }
}

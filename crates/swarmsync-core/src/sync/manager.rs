//! Orchestration of the three sync subsystems
//!
//! The `SyncManager` owns the query coordinator, the health gossip, and the
//! channel reconciler, and runs the tasks that drive them: an inbound
//! dispatch loop, the periodic timers, and the download-completion loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SyncManager                                                 │
//! │  ├── dispatch task: (PeerId, WireMessage) → handler task     │
//! │  ├── eviction timer (1s)   → QueryCoordinator                │
//! │  ├── gossip timer (5s)     → HealthGossip                    │
//! │  ├── reconcile timer (5s)  → ChannelReconciler               │
//! │  ├── completion loop       → ChannelReconciler               │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every inbound message is handled on its own task so a slow store query
//! never blocks dispatch. Shutdown aborts all tasks without draining
//! in-flight work; outstanding request entries are simply dropped.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::downloads::DownloadEngine;
use crate::overlay::PeerOverlay;
use crate::store::MetadataStore;
use crate::sync::events::SyncEvent;
use crate::sync::gossip::HealthGossip;
use crate::sync::protocol::WireMessage;
use crate::sync::query::QueryCoordinator;
use crate::sync::reconciler::ChannelReconciler;
use crate::sync::SyncSettings;
use crate::types::PeerId;

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns and drives the sync subsystems
pub struct SyncManager {
    query: Arc<QueryCoordinator>,
    gossip: Arc<HealthGossip>,
    reconciler: Arc<ChannelReconciler>,
    downloads: Arc<dyn DownloadEngine>,
    settings: SyncSettings,
    event_tx: broadcast::Sender<SyncEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    /// Wire the subsystems around the external collaborators
    ///
    /// `channels_dir` is where channel torrents download into and where the
    /// personal channel's descriptor is exported.
    pub fn new(
        overlay: Arc<dyn PeerOverlay>,
        store: Arc<dyn MetadataStore>,
        downloads: Arc<dyn DownloadEngine>,
        channels_dir: PathBuf,
        settings: SyncSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let write_gate = Arc::new(AsyncMutex::new(()));

        let query = Arc::new(QueryCoordinator::new(
            Arc::clone(&overlay),
            Arc::clone(&store),
            settings.clone(),
            Arc::clone(&write_gate),
        ));
        let gossip = Arc::new(HealthGossip::new(
            Arc::clone(&overlay),
            Arc::clone(&store),
            settings.clone(),
            Arc::clone(&write_gate),
            event_tx.clone(),
        ));
        let reconciler = Arc::new(ChannelReconciler::new(
            store,
            Arc::clone(&downloads),
            channels_dir,
            settings.clone(),
            write_gate,
            event_tx.clone(),
        ));

        Self {
            query,
            gossip,
            reconciler,
            downloads,
            settings,
            event_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to sync events
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// The query coordinator, for issuing selects
    pub fn query(&self) -> &Arc<QueryCoordinator> {
        &self.query
    }

    /// The reconciler, for channel commit/unsubscribe flows
    pub fn reconciler(&self) -> &Arc<ChannelReconciler> {
        &self.reconciler
    }

    /// Start all sync tasks
    ///
    /// `inbound` carries decoded messages from the overlay transport. Each
    /// message is handled on its own task; handler failures are logged and
    /// never stop dispatch.
    pub fn start(&self, mut inbound: mpsc::Receiver<(PeerId, WireMessage)>) {
        info!("Starting sync manager");
        let mut tasks = self.tasks.lock();

        let query = Arc::clone(&self.query);
        let gossip = Arc::clone(&self.gossip);
        tasks.push(task::spawn(async move {
            while let Some((peer, message)) = inbound.recv().await {
                match message {
                    WireMessage::SelectRequest { id, query: params } => {
                        let coordinator = Arc::clone(&query);
                        task::spawn(async move {
                            if let Err(e) =
                                coordinator.handle_select_request(peer, id, &params).await
                            {
                                debug!(%peer, id, error = %e, "Select request handler failed");
                            }
                        });
                    }
                    WireMessage::SelectResponse { id, payload } => {
                        let coordinator = Arc::clone(&query);
                        task::spawn(async move {
                            if let Err(e) =
                                coordinator.handle_select_response(peer, id, payload).await
                            {
                                debug!(%peer, id, error = %e, "Select response handler failed");
                            }
                        });
                    }
                    WireMessage::TorrentsHealth { random, popular } => {
                        let gossip = Arc::clone(&gossip);
                        task::spawn(async move {
                            if let Err(e) =
                                gossip.handle_torrents_health(peer, random, popular).await
                            {
                                warn!(%peer, error = %e, "Health gossip merge failed");
                            }
                        });
                    }
                }
            }
            debug!("Inbound message channel closed");
        }));

        let query = Arc::clone(&self.query);
        let eviction_interval = self.settings.eviction_interval;
        tasks.push(task::spawn(async move {
            let mut interval = tokio::time::interval(eviction_interval);
            loop {
                interval.tick().await;
                query.evict_timed_out();
            }
        }));

        let gossip = Arc::clone(&self.gossip);
        let publish_interval = self.settings.publish_interval;
        tasks.push(task::spawn(async move {
            let mut interval = tokio::time::interval(publish_interval);
            loop {
                interval.tick().await;
                if let Err(e) = gossip.publish_cycle().await {
                    warn!(error = %e, "Health gossip cycle failed");
                }
            }
        }));

        let reconciler = Arc::clone(&self.reconciler);
        let reconcile_interval = self.settings.reconcile_interval;
        tasks.push(task::spawn(async move {
            let mut interval = tokio::time::interval(reconcile_interval);
            loop {
                interval.tick().await;
                reconciler.service_channels().await;
            }
        }));

        let reconciler = Arc::clone(&self.reconciler);
        let mut completions = self.downloads.completions();
        tasks.push(task::spawn(async move {
            loop {
                match completions.recv().await {
                    Ok(handle) => {
                        if let Err(e) = reconciler.on_download_completed(handle).await {
                            warn!(error = %e, "Channel completion handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Lagged behind on download completions");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Completion channel closed");
        }));

        // Publish our own channel in case it committed while we were down.
        let reconciler = Arc::clone(&self.reconciler);
        tasks.push(task::spawn(async move {
            if let Err(e) = reconciler.publish_personal_channel().await {
                warn!(error = %e, "Startup personal channel publish failed");
            }
        }));
    }

    /// Stop all sync tasks
    ///
    /// Aborts without waiting for in-flight handlers; outstanding request
    /// entries are discarded with the coordinator.
    pub fn shutdown(&self) {
        info!("Shutting down sync manager");
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

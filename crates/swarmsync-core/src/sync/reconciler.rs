//! Reconciliation of subscription intent against local download state
//!
//! The reconciler periodically diffs what the store says we subscribe to
//! against what the download engine is actually doing: downloads with no
//! matching subscription are cruft and get removed, subscribed channels
//! with a newer remote revision get fetched, and completed channel
//! downloads are imported exactly once. It also keeps the local personal
//! channel seeded, tolerating the export race with a single deduplicated
//! retry.
//!
//! Each sweep runs its two passes independently: a failing pass is logged
//! and skipped for this cycle, and never aborts the other pass or the loop.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex};
use tokio::task;
use tracing::{debug, info, warn};

use crate::downloads::{DownloadEngine, DownloadHandle, DownloadKind, DownloadRef};
use crate::error::SyncResult;
use crate::store::{MetadataStore, SelectFilter};
use crate::sync::events::SyncEvent;
use crate::sync::SyncSettings;
use crate::types::{ChannelKey, ChannelRecord, ChannelStatus, InfoHash};

/// Personal-channel publish retry state
///
/// `Pending` means one retry task is sleeping; no second retry is ever
/// scheduled while it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishRetry {
    Idle,
    Pending,
}

/// Import bookkeeping for a channel download started this session
struct PendingImport {
    public_key: ChannelKey,
    notify: Option<oneshot::Sender<InfoHash>>,
}

/// Keeps local channel downloads consistent with subscription state
pub struct ChannelReconciler {
    store: Arc<dyn MetadataStore>,
    downloads: Arc<dyn DownloadEngine>,
    /// Directory channel torrents download into and descriptors export to
    channels_dir: PathBuf,
    settings: SyncSettings,
    /// Serializes store writes with the other sync subsystems
    write_gate: Arc<AsyncMutex<()>>,
    events: broadcast::Sender<SyncEvent>,
    pending_imports: Mutex<HashMap<InfoHash, PendingImport>>,
    publish_retry: Mutex<PublishRetry>,
}

impl ChannelReconciler {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        downloads: Arc<dyn DownloadEngine>,
        channels_dir: PathBuf,
        settings: SyncSettings,
        write_gate: Arc<AsyncMutex<()>>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            store,
            downloads,
            channels_dir,
            settings,
            write_gate,
            events,
            pending_imports: Mutex::new(HashMap::new()),
            publish_retry: Mutex::new(PublishRetry::Idle),
        }
    }

    /// Run one reconciliation sweep
    ///
    /// Two independent passes; each failure is logged with its pass name
    /// and retried naturally on the next sweep.
    pub async fn service_channels(&self) {
        if let Err(e) = self.remove_cruft().await {
            warn!(error = %e, "Cruft removal pass failed; retrying next sweep");
        }
        if let Err(e) = self.check_channel_updates().await {
            warn!(error = %e, "Update check pass failed; retrying next sweep");
        }
    }

    /// Remove channel downloads that no longer match a subscription
    ///
    /// On-disk files are deleted with the download unless its directory
    /// name still belongs to a subscribed channel — then the download is a
    /// superseded revision possibly sharing files with the live one, and
    /// only the download record is dropped.
    async fn remove_cruft(&self) -> SyncResult<usize> {
        let store = Arc::clone(&self.store);
        let subscribed = task::spawn_blocking(move || store.subscribed_channels()).await??;

        let hashes: HashSet<InfoHash> = subscribed.iter().map(|c| c.infohash).collect();
        let dirs: HashSet<String> = subscribed.into_iter().map(|c| c.dir_name).collect();

        let cruft: Vec<(DownloadHandle, bool)> = self
            .downloads
            .list(DownloadKind::Channel)
            .into_iter()
            .filter(|d| !hashes.contains(&d.infohash()))
            .map(|d| {
                let delete_files = !dirs.contains(d.dir_name());
                (d, delete_files)
            })
            .collect();

        let count = cruft.len();
        if count > 0 {
            debug!(count, "Removing cruft channel downloads");
        }
        self.remove_downloads(cruft);
        Ok(count)
    }

    /// Dispatch a batch of removals, each as its own task
    ///
    /// A failed removal is logged and never blocks its siblings.
    fn remove_downloads(&self, to_remove: Vec<(DownloadHandle, bool)>) {
        for (handle, delete_files) in to_remove {
            let downloads = Arc::clone(&self.downloads);
            let events = self.events.clone();
            task::spawn(async move {
                let infohash = handle.infohash();
                match downloads.remove(&handle, delete_files) {
                    Ok(()) => {
                        debug!(%infohash, delete_files, "Removed channel download");
                        let _ = events.send(SyncEvent::CruftRemoved {
                            infohash,
                            removed_files: delete_files,
                        });
                    }
                    Err(e) => {
                        warn!(%infohash, error = %e, "Error when removing channel download");
                    }
                }
            });
        }
    }

    /// Start downloads for subscribed channels with a newer remote revision
    async fn check_channel_updates(&self) -> SyncResult<usize> {
        let store = Arc::clone(&self.store);
        let updated = task::spawn_blocking(move || store.updated_channels()).await??;

        let mut started = 0;
        for channel in updated {
            if self.downloads.find(&channel.infohash).is_some() {
                continue;
            }
            match self.download_channel(&channel) {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(
                        channel = %channel.public_key,
                        error = %e,
                        "Failed to start channel download"
                    );
                }
            }
        }
        Ok(started)
    }

    /// Start fetching one channel revision by content hash
    ///
    /// No metadata beyond the hash and expected directory name is known
    /// yet. Returns the engine handle and a notifier resolved when the
    /// completed download has been imported.
    pub fn download_channel(
        &self,
        channel: &ChannelRecord,
    ) -> SyncResult<(DownloadHandle, oneshot::Receiver<InfoHash>)> {
        info!(
            channel = %channel.public_key,
            from = channel.local_version,
            to = channel.remote_timestamp,
            "Downloading new channel revision"
        );

        // Register the import before starting: the engine may signal
        // completion synchronously when the content is already present.
        let (tx, rx) = oneshot::channel();
        self.pending_imports.lock().insert(
            channel.infohash,
            PendingImport {
                public_key: channel.public_key,
                notify: Some(tx),
            },
        );

        let handle = match self.downloads.start(
            DownloadRef::Hash {
                infohash: channel.infohash,
                name: channel.dir_name.clone(),
            },
            &self.channels_dir,
            DownloadKind::Channel,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.pending_imports.lock().remove(&channel.infohash);
                return Err(e);
            }
        };

        let _ = self.events.send(SyncEvent::ChannelDownloadStarted {
            infohash: channel.infohash,
        });
        Ok((handle, rx))
    }

    /// Import a completed channel download, at most once per handle
    ///
    /// The completion signal may arrive twice (synchronously at start time
    /// and asynchronously from the engine); the handle's atomic flag makes
    /// both paths converge to exactly one import. Downloads without a
    /// pending entry (started before a restart) recover their publisher
    /// key from the store by content hash.
    pub async fn on_download_completed(&self, handle: DownloadHandle) -> SyncResult<()> {
        if handle.kind() != DownloadKind::Channel {
            return Ok(());
        }
        if !handle.mark_completed() {
            debug!(infohash = %handle.infohash(), "Completion already handled");
            return Ok(());
        }

        let infohash = handle.infohash();
        // Bind before matching so the table lock is not held across awaits.
        let pending = self.pending_imports.lock().remove(&infohash);
        let (public_key, notify) = match pending {
            Some(pending) => (pending.public_key, pending.notify),
            None => {
                let store = Arc::clone(&self.store);
                let filter = SelectFilter::by_infohash(infohash);
                let records = task::spawn_blocking(move || store.query(&filter)).await??;
                match records.into_iter().next() {
                    Some(channel) => (channel.public_key, None),
                    None => {
                        warn!(%infohash, "Completed channel download matches no known channel");
                        return Ok(());
                    }
                }
            }
        };

        let dir = self.channels_dir.join(handle.dir_name());
        {
            let store = Arc::clone(&self.store);
            let _gate = self.write_gate.lock().await;
            task::spawn_blocking(move || store.import_channel_dir(&dir, &public_key)).await??;
        }

        info!(channel = %public_key, %infohash, "Imported completed channel download");
        if let Some(tx) = notify {
            let _ = tx.send(infohash);
        }
        let _ = self.events.send(SyncEvent::ChannelImported {
            public_key,
            infohash,
        });
        Ok(())
    }

    /// Start seeding the local personal channel if it is committed
    ///
    /// Called at startup and whenever the personal channel commits. Seeds
    /// from the exported descriptor file in the channels directory. When
    /// the descriptor is not there yet (the export may still be running) or
    /// the engine refuses the start, exactly one retry is scheduled.
    pub async fn publish_personal_channel(self: &Arc<Self>) -> SyncResult<()> {
        let store = Arc::clone(&self.store);
        let Some(channel) = task::spawn_blocking(move || store.personal_channel()).await?? else {
            return Ok(());
        };
        if channel.status != ChannelStatus::Committed {
            return Ok(());
        }
        if self.downloads.find(&channel.infohash).is_some() {
            return Ok(());
        }

        let descriptor = self
            .channels_dir
            .join(format!("{}.mdblob", channel.dir_name));
        if !descriptor.exists() {
            debug!(
                path = %descriptor.display(),
                "Channel descriptor not exported yet; scheduling retry"
            );
            self.schedule_publish_retry();
            return Ok(());
        }

        match self.downloads.start(
            DownloadRef::Descriptor(descriptor),
            &self.channels_dir,
            DownloadKind::Channel,
        ) {
            Ok(_) => {
                info!(channel = %channel.public_key, "Seeding personal channel");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to start seeding personal channel; scheduling retry");
                self.schedule_publish_retry();
                Ok(())
            }
        }
    }

    /// Schedule the single publish retry
    ///
    /// `Idle → Pending`: while a retry is pending no further retry can be
    /// scheduled, which stops retry storms while still tolerating the
    /// export race.
    fn schedule_publish_retry(self: &Arc<Self>) {
        {
            let mut state = self.publish_retry.lock();
            if *state == PublishRetry::Pending {
                return;
            }
            *state = PublishRetry::Pending;
        }

        let reconciler = Arc::clone(self);
        let delay = self.settings.publish_retry_delay;
        task::spawn(async move {
            tokio::time::sleep(delay).await;
            *reconciler.publish_retry.lock() = PublishRetry::Idle;
            if let Err(e) = reconciler.publish_personal_channel().await {
                warn!(error = %e, "Personal channel publish retry failed");
            }
        });
    }

    /// Unsubscribe a channel and drop its local downloads
    ///
    /// The store clears the channel's contents and resets its imported
    /// version; every download unpacking into the channel's directory is
    /// then removed together with its files.
    pub async fn remove_channel(&self, channel: &ChannelRecord) -> SyncResult<()> {
        let key = channel.public_key;
        {
            let store = Arc::clone(&self.store);
            let _gate = self.write_gate.lock().await;
            task::spawn_blocking(move || store.reset_channel(&key)).await??;
        }

        let to_remove: Vec<(DownloadHandle, bool)> = self
            .downloads
            .list(DownloadKind::Channel)
            .into_iter()
            .filter(|d| d.dir_name() == channel.dir_name)
            .map(|d| (d, true))
            .collect();

        info!(channel = %key, downloads = to_remove.len(), "Removing channel");
        self.remove_downloads(to_remove);
        Ok(())
    }
}

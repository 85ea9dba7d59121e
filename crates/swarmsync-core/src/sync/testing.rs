//! Test doubles for the external collaborators
//!
//! An in-memory metadata store, a recording overlay, and a scriptable
//! download engine, shared by the sync subsystem tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::downloads::{DownloadEngine, DownloadHandle, DownloadKind, DownloadRef};
use crate::error::{SyncError, SyncResult};
use crate::overlay::PeerOverlay;
use crate::store::{MetadataStore, SelectFilter};
use crate::sync::chunk::chunk_to_records;
use crate::sync::protocol::WireMessage;
use crate::types::{ChannelKey, ChannelRecord, HealthRecord, InfoHash, PeerId};

/// Install a fmt subscriber for a test when `RUST_LOG` asks for output
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds, advancing (possibly virtual) time
///
/// Panics when the condition is not reached; background tasks get real
/// thread time between polls.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
struct MemoryState {
    channels: BTreeMap<ChannelKey, ChannelRecord>,
    health: HashMap<InfoHash, HealthRecord>,
    votes: Vec<(ChannelKey, PeerId)>,
    imported_dirs: Vec<(PathBuf, ChannelKey)>,
    personal: Option<ChannelKey>,
}

/// In-memory [`MetadataStore`] with failure injection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_subscribed: AtomicBool,
    fail_imports: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_channel(&self, record: ChannelRecord) {
        self.state
            .lock()
            .channels
            .insert(record.public_key, record);
    }

    pub fn insert_health(&self, record: HealthRecord) {
        self.state.lock().health.insert(record.infohash, record);
    }

    pub fn set_personal(&self, key: ChannelKey) {
        self.state.lock().personal = Some(key);
    }

    pub fn set_fail_subscribed(&self, fail: bool) {
        self.fail_subscribed.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_imports(&self, fail: bool) {
        self.fail_imports.store(fail, Ordering::SeqCst);
    }

    pub fn channel(&self, key: &ChannelKey) -> Option<ChannelRecord> {
        self.state.lock().channels.get(key).cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn health(&self, infohash: &InfoHash) -> Option<HealthRecord> {
        self.state.lock().health.get(infohash).copied()
    }

    pub fn votes(&self) -> Vec<(ChannelKey, PeerId)> {
        self.state.lock().votes.clone()
    }

    pub fn imported_dirs(&self) -> Vec<(PathBuf, ChannelKey)> {
        self.state.lock().imported_dirs.clone()
    }
}

impl MetadataStore for MemoryStore {
    fn query(&self, filter: &SelectFilter) -> SyncResult<Vec<ChannelRecord>> {
        let state = self.state.lock();
        Ok(state
            .channels
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    fn updated_channels(&self) -> SyncResult<Vec<ChannelRecord>> {
        let state = self.state.lock();
        Ok(state
            .channels
            .values()
            .filter(|c| c.subscribed && c.has_update())
            .cloned()
            .collect())
    }

    fn subscribed_channels(&self) -> SyncResult<Vec<ChannelRecord>> {
        if self.fail_subscribed.load(Ordering::SeqCst) {
            return Err(SyncError::Store("simulated scan failure".to_string()));
        }
        let state = self.state.lock();
        Ok(state
            .channels
            .values()
            .filter(|c| c.subscribed)
            .cloned()
            .collect())
    }

    fn personal_channel(&self) -> SyncResult<Option<ChannelRecord>> {
        let state = self.state.lock();
        Ok(state
            .personal
            .as_ref()
            .and_then(|key| state.channels.get(key))
            .cloned())
    }

    fn import_blob(&self, blob: &[u8], voter: Option<PeerId>) -> SyncResult<usize> {
        if self.fail_imports.load(Ordering::SeqCst) {
            return Err(SyncError::Store("simulated import failure".to_string()));
        }
        let records = chunk_to_records(blob)?;
        let mut state = self.state.lock();
        let count = records.len();
        for record in records {
            if let Some(peer) = voter {
                state.votes.push((record.public_key, peer));
            }
            state.channels.insert(record.public_key, record);
        }
        Ok(count)
    }

    fn import_channel_dir(&self, dir: &Path, channel: &ChannelKey) -> SyncResult<()> {
        if self.fail_imports.load(Ordering::SeqCst) {
            return Err(SyncError::Store("simulated import failure".to_string()));
        }
        let mut state = self.state.lock();
        state.imported_dirs.push((dir.to_path_buf(), *channel));
        if let Some(record) = state.channels.get_mut(channel) {
            record.local_version = record.remote_timestamp;
        }
        Ok(())
    }

    fn torrent_health(&self, infohash: &InfoHash) -> SyncResult<Option<HealthRecord>> {
        Ok(self.state.lock().health.get(infohash).copied())
    }

    fn upsert_health(&self, record: &HealthRecord) -> SyncResult<()> {
        self.state.lock().health.insert(record.infohash, *record);
        Ok(())
    }

    fn checked_torrents(&self) -> SyncResult<Vec<HealthRecord>> {
        let state = self.state.lock();
        let mut checked: Vec<HealthRecord> = state.health.values().copied().collect();
        checked.sort_by_key(|r| r.infohash);
        Ok(checked)
    }

    fn reset_channel(&self, channel: &ChannelKey) -> SyncResult<()> {
        let mut state = self.state.lock();
        if let Some(record) = state.channels.get_mut(channel) {
            record.subscribed = false;
            record.local_version = 0;
        }
        Ok(())
    }
}

/// Recording [`PeerOverlay`] with a scripted peer set
#[derive(Default)]
pub struct MockOverlay {
    peers: Mutex<Vec<PeerId>>,
    sent: Mutex<Vec<(PeerId, WireMessage)>>,
    fail_sends: AtomicBool,
}

impl MockOverlay {
    pub fn new(peers: Vec<PeerId>) -> Self {
        Self {
            peers: Mutex::new(peers),
            ..Self::default()
        }
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(PeerId, WireMessage)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl PeerOverlay for MockOverlay {
    fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().clone()
    }

    fn send(&self, peer: &PeerId, message: WireMessage) -> SyncResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SyncError::Overlay("simulated send failure".to_string()));
        }
        self.sent.lock().push((*peer, message));
        Ok(())
    }
}

#[derive(Default)]
struct DownloadsState {
    active: Vec<DownloadHandle>,
    started: Vec<(DownloadRef, PathBuf, DownloadKind)>,
    removed: Vec<(InfoHash, bool)>,
    remove_attempts: Vec<InfoHash>,
    failing_removals: HashSet<InfoHash>,
}

/// Scriptable [`DownloadEngine`]
pub struct MockDownloads {
    state: Mutex<DownloadsState>,
    completion_tx: broadcast::Sender<DownloadHandle>,
    /// Emit the completion event during `start` (content already present)
    complete_immediately: AtomicBool,
}

impl Default for MockDownloads {
    fn default() -> Self {
        let (completion_tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(DownloadsState::default()),
            completion_tx,
            complete_immediately: AtomicBool::new(false),
        }
    }
}

impl MockDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_active(&self, handle: DownloadHandle) {
        self.state.lock().active.push(handle);
    }

    pub fn fail_removal_of(&self, infohash: InfoHash) {
        self.state.lock().failing_removals.insert(infohash);
    }

    pub fn set_complete_immediately(&self, value: bool) {
        self.complete_immediately.store(value, Ordering::SeqCst);
    }

    pub fn fire_completion(&self, handle: &DownloadHandle) {
        let _ = self.completion_tx.send(handle.clone());
    }

    pub fn started(&self) -> Vec<(DownloadRef, PathBuf, DownloadKind)> {
        self.state.lock().started.clone()
    }

    pub fn removed(&self) -> Vec<(InfoHash, bool)> {
        self.state.lock().removed.clone()
    }

    pub fn remove_attempts(&self) -> Vec<InfoHash> {
        self.state.lock().remove_attempts.clone()
    }
}

/// Derive a deterministic infohash for descriptor-seeded downloads
fn descriptor_infohash(path: &Path) -> InfoHash {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut bytes = [0u8; 20];
    for (i, b) in stem.bytes().take(20).enumerate() {
        bytes[i] = b;
    }
    InfoHash::from_bytes(bytes)
}

impl DownloadEngine for MockDownloads {
    fn start(
        &self,
        source: DownloadRef,
        dest_dir: &Path,
        kind: DownloadKind,
    ) -> SyncResult<DownloadHandle> {
        let (infohash, dir_name) = match &source {
            DownloadRef::Hash { infohash, name } => (*infohash, name.clone()),
            DownloadRef::Descriptor(path) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (descriptor_infohash(path), stem)
            }
        };

        let handle = DownloadHandle::new(infohash, dir_name, kind);
        {
            let mut state = self.state.lock();
            state.active.push(handle.clone());
            state.started.push((source, dest_dir.to_path_buf(), kind));
        }

        if self.complete_immediately.load(Ordering::SeqCst) {
            let _ = self.completion_tx.send(handle.clone());
        }
        Ok(handle)
    }

    fn remove(&self, handle: &DownloadHandle, delete_files: bool) -> SyncResult<()> {
        let mut state = self.state.lock();
        let infohash = handle.infohash();
        state.remove_attempts.push(infohash);
        if state.failing_removals.contains(&infohash) {
            return Err(SyncError::Download("simulated removal failure".to_string()));
        }
        state.active.retain(|d| d.infohash() != infohash);
        state.removed.push((infohash, delete_files));
        Ok(())
    }

    fn list(&self, kind: DownloadKind) -> Vec<DownloadHandle> {
        self.state
            .lock()
            .active
            .iter()
            .filter(|d| d.kind() == kind)
            .cloned()
            .collect()
    }

    fn find(&self, infohash: &InfoHash) -> Option<DownloadHandle> {
        self.state
            .lock()
            .active
            .iter()
            .find(|d| d.infohash() == *infohash)
            .cloned()
    }

    fn completions(&self) -> broadcast::Receiver<DownloadHandle> {
        self.completion_tx.subscribe()
    }
}

/// A committed, subscribed channel record for tests
pub fn channel_fixture(n: u8, dir_name: &str) -> ChannelRecord {
    ChannelRecord {
        public_key: ChannelKey::from_bytes([n; 32]),
        infohash: InfoHash::from_bytes([n; 20]),
        dir_name: dir_name.to_string(),
        local_version: 1,
        remote_timestamp: 1,
        subscribed: true,
        status: crate::types::ChannelStatus::Committed,
    }
}

/// A health observation for tests
pub fn health_fixture(n: u8, seeders: u32, last_check: u64) -> HealthRecord {
    HealthRecord {
        infohash: InfoHash::from_bytes([n; 20]),
        seeders,
        leechers: seeders / 2,
        last_check,
    }
}

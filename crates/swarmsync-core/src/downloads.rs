//! Download engine seam
//!
//! The content-transfer engine is an external collaborator; this module
//! defines the contract the reconciler drives. A download is addressed by a
//! [`DownloadRef`] (a bare content hash when no metadata is known yet, or a
//! local descriptor file when seeding our own channel) and tagged with a
//! [`DownloadKind`] so channel bookkeeping never touches regular content
//! transfers.
//!
//! ## Completion signalling
//!
//! Engines deliver completion through the broadcast channel returned by
//! [`DownloadEngine::completions`]. The signal may fire synchronously during
//! [`DownloadEngine::start`] (the content was already fully present) or
//! asynchronously later; an engine that finds the content complete at start
//! time must still emit the event. Consumers converge both paths to exactly
//! one side effect via [`DownloadHandle::mark_completed`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::SyncResult;
use crate::types::InfoHash;

/// Category of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// A channel torrent managed by the reconciler
    Channel,
    /// Regular content; never touched by channel bookkeeping
    Content,
}

/// Addressing for a new download
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadRef {
    /// Fetch by content hash; no metadata beyond the expected directory name
    Hash {
        /// Content hash to resolve from the swarm
        infohash: InfoHash,
        /// Directory name the content is expected to unpack into
        name: String,
    },
    /// Seed from an exported descriptor file on local disk
    Descriptor(PathBuf),
}

#[derive(Debug)]
struct HandleState {
    infohash: InfoHash,
    dir_name: String,
    kind: DownloadKind,
    completed: AtomicBool,
}

/// Reference to a download owned by the engine
///
/// Clones share state: the completion flag is checked-and-set atomically so
/// that the completion signal leads to at most one import no matter which
/// path (synchronous or asynchronous) observes it first.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    state: Arc<HandleState>,
}

impl DownloadHandle {
    /// Create a handle for a download of `kind` unpacking into `dir_name`
    pub fn new(infohash: InfoHash, dir_name: impl Into<String>, kind: DownloadKind) -> Self {
        Self {
            state: Arc::new(HandleState {
                infohash,
                dir_name: dir_name.into(),
                kind,
                completed: AtomicBool::new(false),
            }),
        }
    }

    /// Content hash this download is addressed by
    pub fn infohash(&self) -> InfoHash {
        self.state.infohash
    }

    /// Directory name the download unpacks into
    pub fn dir_name(&self) -> &str {
        &self.state.dir_name
    }

    /// Category of this download
    pub fn kind(&self) -> DownloadKind {
        self.state.kind
    }

    /// Claim the completion of this download
    ///
    /// Returns `true` exactly once per handle; every later call (from any
    /// clone) returns `false`.
    pub fn mark_completed(&self) -> bool {
        !self.state.completed.swap(true, Ordering::SeqCst)
    }

    /// Whether completion has already been claimed
    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::SeqCst)
    }
}

/// Contract of the external download engine
pub trait DownloadEngine: Send + Sync {
    /// Start (or resume) a download into `dest_dir`
    fn start(
        &self,
        source: DownloadRef,
        dest_dir: &Path,
        kind: DownloadKind,
    ) -> SyncResult<DownloadHandle>;

    /// Remove a download, optionally deleting its on-disk content
    fn remove(&self, handle: &DownloadHandle, delete_files: bool) -> SyncResult<()>;

    /// All active downloads of the given kind
    fn list(&self, kind: DownloadKind) -> Vec<DownloadHandle>;

    /// Active download addressed by this content hash, if any
    fn find(&self, infohash: &InfoHash) -> Option<DownloadHandle>;

    /// Subscribe to completion events
    fn completions(&self) -> broadcast::Receiver<DownloadHandle>;
}

//! Swarmsync Core Library
//!
//! Synchronization core of a decentralized content-indexing overlay: peers
//! exchange channel metadata, gossip torrent health statistics, and
//! reconcile local subscriptions against remotely observed state.
//!
//! ## Overview
//!
//! Three always-running subsystems cooperate, all driven by the
//! [`SyncManager`]:
//!
//! - **Remote queries**: SELECT-like metadata queries against peer stores,
//!   with request/response correlation under bounded memory and a bounded
//!   per-request response budget.
//! - **Health gossip**: epidemic dissemination of freshness-stamped torrent
//!   health statistics to random peers, merged last-writer-wins by
//!   observation time.
//! - **Channel reconciliation**: a periodic sweep that removes downloads no
//!   longer covered by a subscription, fetches updated channel revisions,
//!   imports completed downloads exactly once, and keeps the local personal
//!   channel seeded.
//!
//! The overlay transport, the metadata store, and the download engine are
//! external collaborators consumed through the [`PeerOverlay`],
//! [`MetadataStore`], and [`DownloadEngine`] traits.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use swarmsync_core::{SyncManager, SyncSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(256);
//!     // overlay / store / downloads are the embedder's implementations
//!     let manager = SyncManager::new(
//!         overlay,
//!         store,
//!         downloads,
//!         "/data/channels".into(),
//!         SyncSettings::default(),
//!     );
//!     manager.start(inbound_rx);
//!
//!     // Ask a few random peers for their subscribed channels
//!     manager.query().broadcast_select(&Default::default());
//! }
//! ```

pub mod downloads;
pub mod error;
pub mod overlay;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use downloads::{DownloadEngine, DownloadHandle, DownloadKind, DownloadRef};
pub use error::{SyncError, SyncResult};
pub use overlay::PeerOverlay;
pub use store::{MetadataStore, SelectFilter};
pub use sync::{
    ChannelReconciler, HealthGossip, QueryCoordinator, SyncEvent, SyncManager, SyncSettings,
    WireMessage,
};
pub use types::*;

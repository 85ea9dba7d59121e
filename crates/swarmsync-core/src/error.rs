//! Error types for the swarmsync core

use thiserror::Error;

/// Main error type for swarmsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Error reported by the metadata store
    #[error("Store error: {0}")]
    Store(String),

    /// Error reported by the peer overlay while sending
    #[error("Overlay error: {0}")]
    Overlay(String),

    /// Error reported by the download engine
    #[error("Download error: {0}")]
    Download(String),

    /// A protocol-level invariant was violated by local or remote data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single serialized record does not fit into one response chunk
    #[error("Record of {size} bytes exceeds the {limit}-byte payload budget")]
    RecordTooLarge { size: usize, limit: usize },

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Wire message or record encoding error
    #[error("Wire encoding error: {0}")]
    Postcard(#[from] postcard::Error),

    /// Query parameter (JSON) encoding error
    #[error("Query encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker-dispatched operation panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Store("table missing".to_string());
        assert_eq!(format!("{}", err), "Store error: table missing");
    }

    #[test]
    fn test_record_too_large_display() {
        let err = SyncError::RecordTooLarge {
            size: 1500,
            limit: 1300,
        };
        assert_eq!(
            format!("{}", err),
            "Record of 1500 bytes exceeds the 1300-byte payload budget"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let sync_err: SyncError = io_err.into();
        assert!(matches!(sync_err, SyncError::Io(_)));
    }
}

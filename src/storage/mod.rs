//! Object storage for rendered report artifacts.
//!
//! Ownership of artifact bytes passes to the storage backend on `save`.
//! Writers and readers agree on one key convention:
//!
//! ```text
//! reports/<family>/<report_id>.<FORMAT>
//! ```
//!
//! where `<FORMAT>` is the uppercase format token (`HTML`, `PDF`, ...).
//!
//! # Backends
//!
//! - [`FsObjectStorage`]: keys map to relative paths under a root directory
//! - [`MemoryObjectStorage`]: in-process map for tests and embedding

pub mod fs;
pub mod memory;

pub use self::fs::FsObjectStorage;
pub use self::memory::MemoryObjectStorage;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::types::{ReportFormat, ReportType};

/// Readable stream over a stored artifact.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No object stored under the key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Key is empty, absolute, or escapes the storage root.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Storage directory creation failed.
    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),
}

/// Blob store for report artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous object.
    async fn save(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    /// Opens a stream over the object stored under `key`.
    async fn get_stream(&self, key: &str) -> Result<ByteStream, StorageError>;

    /// Removes the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Returns true if an object is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Deterministic artifact key for a report in one format.
pub fn artifact_key(report_type: ReportType, report_id: &str, format: ReportFormat) -> String {
    format!(
        "reports/{}/{}.{}",
        report_type.as_str(),
        report_id,
        format.token()
    )
}

/// Validates a key and returns its path segments.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, StorageError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// Content type implied by an artifact key's extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    ReportFormat::ALL
        .iter()
        .find(|f| f.token().eq_ignore_ascii_case(ext))
        .map(|f| f.content_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_convention() {
        assert_eq!(
            artifact_key(ReportType::Fto, "abc", ReportFormat::Pdf),
            "reports/fto/abc.PDF"
        );
        assert_eq!(
            artifact_key(ReportType::Portfolio, "r1", ReportFormat::Html),
            "reports/portfolio/r1.HTML"
        );
    }

    #[test]
    fn test_key_segments_rejects_traversal() {
        assert!(key_segments("reports/fto/a.PDF").is_ok());
        assert!(key_segments("").is_err());
        assert!(key_segments("/etc/passwd").is_err());
        assert!(key_segments("reports/../secret").is_err());
        assert!(key_segments("reports//a").is_err());
    }

    #[test]
    fn test_content_type_for_key() {
        assert_eq!(content_type_for_key("reports/fto/a.PDF"), "application/pdf");
        assert_eq!(
            content_type_for_key("reports/fto/a.HTML"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            content_type_for_key("reports/fto/a.bin"),
            "application/octet-stream"
        );
    }
}

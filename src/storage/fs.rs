//! Filesystem-backed object storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::{key_segments, ByteStream, ObjectStorage, StorageError};

/// Stores each object as a file under `root`, at the path named by its key.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn save(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::DirectoryCreationFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        // Write to a sibling temp file then rename so readers never see a
        // partially written artifact.
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(key = %key, size = bytes.len(), content_type = %content_type, "Stored artifact");
        Ok(())
    }

    async fn get_stream(&self, key: &str) -> Result<ByteStream, StorageError> {
        let path = self.path_for(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_save_and_stream() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path());

        storage
            .save("reports/fto/r1.HTML", b"<p>ok</p>".to_vec(), "text/html")
            .await
            .unwrap();
        assert!(dir.path().join("reports/fto/r1.HTML").exists());
        assert!(storage.exists("reports/fto/r1.HTML").await.unwrap());

        let mut stream = storage.get_stream("reports/fto/r1.HTML").await.unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "<p>ok</p>");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path());

        let err = storage.get_stream("reports/fto/none.PDF").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!storage.exists("reports/fto/none.PDF").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path());

        storage
            .save("reports/fto/r1.PDF", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();
        storage.delete("reports/fto/r1.PDF").await.unwrap();
        storage.delete("reports/fto/r1.PDF").await.unwrap();
        assert!(!storage.exists("reports/fto/r1.PDF").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path());

        let err = storage
            .save("../outside", vec![0], "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}

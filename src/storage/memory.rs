//! In-memory object store
//!
//! Keeps containers and blobs in process. Used for local development
//! (`backend = "memory"`) and by the test suite. Container names follow the
//! same rules the Blob service enforces.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{
    validate_blob_name, validate_container_name, BlobDescriptor, BlobDownload, ObjectStore, DEFAULT_CONTENT_TYPE,
};
use crate::error::{Error, Result};

/// Chunk size used when streaming a blob back
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

type Container = BTreeMap<String, StoredBlob>;

/// Object store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RwLock<BTreeMap<String, Container>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored in a container
    pub fn blob_count(&self, container: &str) -> usize {
        self.read()
            .map(|c| c.get(container).map_or(0, |blobs| blobs.len()))
            .unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Container>>> {
        self.containers
            .read()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Container>>> {
        self.containers
            .write()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn create_container(&self, container: &str) -> Result<bool> {
        validate_container_name(container)?;
        let mut containers = self.write()?;
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), Container::new());
        Ok(true)
    }

    async fn delete_container(&self, container: &str) -> Result<bool> {
        validate_container_name(container)?;
        Ok(self.write()?.remove(container).is_some())
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobDescriptor>> {
        let containers = self.read()?;
        let blobs = containers
            .get(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_string()))?;

        Ok(blobs
            .iter()
            .map(|(name, blob)| BlobDescriptor {
                name: name.clone(),
                content_type: Some(blob.content_type.clone()),
                size: blob.data.len() as u64,
                last_modified: Some(blob.last_modified),
            })
            .collect())
    }

    async fn upload_file(
        &self,
        container: &str,
        blob: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<()> {
        validate_blob_name(blob)?;
        let data = Bytes::from(tokio::fs::read(path).await?);

        let mut containers = self.write()?;
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_string()))?;

        blobs.insert(
            blob.to_string(),
            StoredBlob {
                data,
                content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn download(&self, container: &str, blob: &str) -> Result<BlobDownload> {
        let stored = {
            let containers = self.read()?;
            let blobs = containers
                .get(container)
                .ok_or_else(|| Error::ContainerNotFound(container.to_string()))?;
            blobs
                .get(blob)
                .cloned()
                .ok_or_else(|| Error::BlobNotFound(blob.to_string()))?
        };

        let len = stored.data.len();
        let chunks: Vec<std::io::Result<Bytes>> = (0..len)
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| Ok(stored.data.slice(start..(start + STREAM_CHUNK_SIZE).min(len))))
            .collect();

        Ok(BlobDownload {
            content_type: stored.content_type,
            content_length: Some(len as u64),
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn collect(download: BlobDownload) -> Vec<u8> {
        let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
        chunks.concat()
    }

    fn staged(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_create_and_delete_are_idempotent() {
        let store = MemoryStore::new();

        assert!(store.create_container("media").await.unwrap());
        assert!(!store.create_container("media").await.unwrap());
        assert_eq!(store.list_containers().await.unwrap(), vec!["media"]);

        assert!(store.delete_container("media").await.unwrap());
        assert!(!store.delete_container("media").await.unwrap());
        assert!(store.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_container_names() {
        let store = MemoryStore::new();
        let err = store.create_container("Media").await.unwrap_err();
        assert!(matches!(err, Error::InvalidContainerName(_)));
    }

    #[tokio::test]
    async fn test_upload_overwrites_and_streams_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.create_container("media").await.unwrap();

        let first = staged(&dir, "first", b"first payload");
        store.upload_file("media", "a.txt", &first, Some("text/plain")).await.unwrap();

        let big = vec![42u8; STREAM_CHUNK_SIZE * 2 + 5];
        let second = staged(&dir, "second", &big);
        store.upload_file("media", "a.txt", &second, None).await.unwrap();

        assert_eq!(store.blob_count("media"), 1);

        let download = store.download("media", "a.txt").await.unwrap();
        assert_eq!(download.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(download.content_length, Some(big.len() as u64));
        assert_eq!(collect(download).await, big);

        let listed = store.list_blobs("media").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, big.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_container_and_blob() {
        let store = MemoryStore::new();
        assert!(store.list_blobs("absent").await.unwrap_err().is_not_found());
        assert!(store.download("absent", "x").await.unwrap_err().is_not_found());

        store.create_container("present").await.unwrap();
        let err = store.download("present", "x").await.unwrap_err();
        assert!(matches!(err, Error::BlobNotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_blob_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"a").unwrap();

        let store = MemoryStore::new();
        store.create_container("media").await.unwrap();
        let err = store.upload_file("media", "", &path, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidBlobName(_)));
        assert_eq!(store.blob_count("media"), 0);
    }

    #[tokio::test]
    async fn test_empty_blob_downloads_as_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.create_container("media").await.unwrap();
        let empty = staged(&dir, "empty", b"");
        store.upload_file("media", "empty.bin", &empty, None).await.unwrap();

        let download = store.download("media", "empty.bin").await.unwrap();
        assert_eq!(download.content_length, Some(0));
        assert!(collect(download).await.is_empty());
    }
}

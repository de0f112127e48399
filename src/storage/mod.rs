//! Object Store Module
//!
//! The gateway talks to storage exclusively through the [`ObjectStore`]
//! trait. Two implementations exist: [`AzureBlobStore`] speaks the Azure
//! Blob REST API, [`MemoryStore`] keeps everything in process.

pub mod azure;
pub mod connection;
pub mod memory;
mod signing;
mod xml;

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Error, Result};

pub use azure::AzureBlobStore;
pub use connection::{ConnectionString, Credential};
pub use memory::MemoryStore;

/// Content type reported for blobs stored without one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Streamed blob body
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Metadata of one stored blob, as returned by `/files`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDescriptor {
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// An open blob download
pub struct BlobDownload {
    /// Content type recorded on the blob
    pub content_type: String,
    /// Body length, when the backend reports it
    pub content_length: Option<u64>,
    /// Blob bytes, yielded as they arrive from the backend
    pub body: ByteStream,
}

impl std::fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Container and blob operations the gateway needs from a storage backend.
///
/// Implementations are shared across all in-flight requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs and health output
    fn kind(&self) -> &'static str;

    /// Names of every container visible to the configured credentials
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Create a container; returns false if it already existed
    async fn create_container(&self, container: &str) -> Result<bool>;

    /// Delete a container; returns false if it did not exist
    async fn delete_container(&self, container: &str) -> Result<bool>;

    /// Metadata of every blob in a container
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobDescriptor>>;

    /// Store the contents of a local file as `blob`, replacing any existing blob
    async fn upload_file(
        &self,
        container: &str,
        blob: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Open a blob for streaming
    async fn download(&self, container: &str, blob: &str) -> Result<BlobDownload>;
}

/// Build the object store selected by the configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        BackendKind::Azure => {
            let raw = config.connection_string.as_deref().ok_or_else(|| {
                Error::Config("azure backend requires a connection string".into())
            })?;
            let connection = ConnectionString::parse(raw)?;
            Ok(Arc::new(AzureBlobStore::new(connection)?))
        }
        BackendKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Check a container name against the Azure naming rules: 3-63 characters,
/// lowercase letters, digits and single hyphens, starting and ending with a
/// letter or digit.
pub fn validate_container_name(name: &str) -> Result<()> {
    let invalid = || Error::InvalidContainerName(name.to_string());

    if !(3..=63).contains(&name.len()) {
        return Err(invalid());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid());
    }

    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(invalid());
    }

    Ok(())
}

/// Blob names are used verbatim but must be 1-1024 characters long.
pub fn validate_blob_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > 1024 {
        return Err(Error::InvalidBlobName(name.to_string()));
    }
    Ok(())
}

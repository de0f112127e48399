//! WolfBlob - HTTP Gateway for Azure Blob Storage
//!
//! A small Rust service that exposes an Azure storage account over a plain
//! JSON/HTTP API: list, create and delete containers, list the files of a
//! target container, upload files and stream them back.
//!
//! # Architecture
//!
//! Every route is a thin adapter over the [`storage::ObjectStore`] trait.
//! The store is built once at start-up and shared by all requests; the
//! gateway itself keeps no state between requests.
//!
//! # Features
//!
//! - Idempotent container create/delete with lowercase name normalization
//! - Multipart uploads staged to disk and removed after transfer
//! - Chunked block uploads for large files
//! - Streamed downloads without buffering the blob in memory
//! - Shared Key and SAS authorization from a standard connection string
//! - In-memory backend for local development

pub mod config;
pub mod error;
pub mod storage;
pub mod api;

pub use config::WolfBlobConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BackendKind, WolfBlobConfig};
    pub use crate::error::{Error, Result};
    pub use crate::storage::{BlobDescriptor, BlobDownload, ObjectStore};
    pub use crate::api::HttpServer;
}

//! WolfBlob Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for WolfBlob operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfBlob error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid connection string: {0}")]
    ConnectionString(String),

    // Storage backend errors
    /// Error reported by the storage service itself; displays the
    /// service message verbatim.
    #[error("{message}")]
    Storage {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("The specified container does not exist: {0}")]
    ContainerNotFound(String),

    #[error("The specified blob does not exist: {0}")]
    BlobNotFound(String),

    #[error("The specified container name is invalid: {0}")]
    InvalidContainerName(String),

    #[error("The specified blob name is invalid: {0:?}")]
    InvalidBlobName(String),

    #[error("Malformed storage response: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    #[error("Request signing failed: {0}")]
    Signing(String),

    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // Request errors
    #[error("Upload failed: {0}")]
    Upload(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Storage error code reported by the backend, if any
    pub fn storage_code(&self) -> Option<&str> {
        match self {
            Error::Storage { code, .. } => code.as_deref(),
            Error::ContainerNotFound(_) => Some("ContainerNotFound"),
            Error::BlobNotFound(_) => Some("BlobNotFound"),
            Error::InvalidContainerName(_) | Error::InvalidBlobName(_) => {
                Some("InvalidResourceName")
            }
            _ => None,
        }
    }

    /// Check if the backend reported the target as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ContainerNotFound(_) | Error::BlobNotFound(_) => true,
            Error::Storage { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// JSON error envelope returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Every failure surfaces as a 500 with the message text; the backend's
/// finer-grained status is deliberately not mapped.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

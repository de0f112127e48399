//! HTTP API Module
//!
//! Provides the REST API for containers, file listing, uploads and downloads.

mod http;
pub mod staging;

pub use http::{AppState, HttpServer};

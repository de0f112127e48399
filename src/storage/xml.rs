//! Blob service XML bodies
//!
//! Enumeration results for containers and blobs, error bodies, and the
//! block list sent to commit a chunked upload.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::BlobDescriptor;
use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerEnumeration {
    #[serde(default)]
    containers: ContainerList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Deserialize)]
struct ContainerItem {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEnumeration {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: BlobProperties,
}

#[derive(Debug, Default, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
    #[serde(rename = "Content-Type", default)]
    content_type: Option<String>,
}

/// `<Error>` body returned with failed requests
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The service prefixes some bodies with a UTF-8 byte order mark
fn strip_bom(body: &str) -> &str {
    body.trim_start_matches('\u{feff}')
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Container names and the continuation marker from a List Containers page
pub(crate) fn parse_container_list(body: &str) -> Result<(Vec<String>, Option<String>)> {
    let page: ContainerEnumeration = quick_xml::de::from_str(strip_bom(body))?;
    let names = page.containers.items.into_iter().map(|c| c.name).collect();
    Ok((names, non_empty(page.next_marker)))
}

/// Blob descriptors and the continuation marker from a List Blobs page
pub(crate) fn parse_blob_list(body: &str) -> Result<(Vec<BlobDescriptor>, Option<String>)> {
    let page: BlobEnumeration = quick_xml::de::from_str(strip_bom(body))?;
    let blobs = page
        .blobs
        .items
        .into_iter()
        .map(|b| BlobDescriptor {
            name: b.name,
            content_type: non_empty(b.properties.content_type),
            size: b.properties.content_length.unwrap_or(0),
            last_modified: b
                .properties
                .last_modified
                .as_deref()
                .and_then(parse_http_date),
        })
        .collect();
    Ok((blobs, non_empty(page.next_marker)))
}

/// Error code and message from a failure body, if it has one
pub(crate) fn parse_error(body: &str) -> Option<ErrorBody> {
    let body = strip_bom(body).trim();
    if body.is_empty() {
        return None;
    }
    quick_xml::de::from_str::<ErrorBody>(body).ok()
}

/// Put Block List body committing the given block ids in order
pub(crate) fn block_list(block_ids: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>\n");
    for id in block_ids {
        xml.push_str(&format!("  <Latest>{}</Latest>\n", id));
    }
    xml.push_str("</BlockList>");
    xml
}

/// Parse an RFC 1123 timestamp such as `Tue, 01 Oct 2024 10:00:00 GMT`
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

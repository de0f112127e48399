//! Azure Blob Storage backend
//!
//! Speaks the Blob service REST API directly with `reqwest`. Requests are
//! authorized with Shared Key signatures or a SAS token taken from the
//! connection string.
//!
//! Uploads up to [`BLOCK_SIZE`] go out as a single Put Blob. Larger files are
//! read one block at a time, staged with Put Block and committed with Put
//! Block List, so memory use stays bounded by the block size.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use futures::TryStreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::connection::{ConnectionString, Credential};
use super::{signing, validate_blob_name, xml, BlobDescriptor, BlobDownload, ObjectStore, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, Result};

/// Blob service API version sent with every request
pub const API_VERSION: &str = "2021-08-06";

/// Upload block size
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Everything except unreserved characters and `/` is escaped in blob paths
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

const X_MS_DATE: &str = "x-ms-date";
const X_MS_VERSION: &str = "x-ms-version";
const X_MS_BLOB_TYPE: &str = "x-ms-blob-type";
const X_MS_BLOB_CONTENT_TYPE: &str = "x-ms-blob-content-type";
const X_MS_ERROR_CODE: &str = "x-ms-error-code";

/// Object store backed by an Azure storage account
pub struct AzureBlobStore {
    client: reqwest::Client,
    connection: ConnectionString,
}

impl AzureBlobStore {
    /// Create a client for the account described by the connection string
    pub fn new(connection: ConnectionString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        info!(
            "Azure blob backend initialized: endpoint={} account={}",
            connection.blob_endpoint,
            connection.account_name.as_deref().unwrap_or("<sas>")
        );

        Ok(Self { client, connection })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = if path.is_empty() {
            format!("{}/", self.connection.blob_endpoint)
        } else {
            format!(
                "{}/{}",
                self.connection.blob_endpoint,
                utf8_percent_encode(path, PATH_ENCODE_SET)
            )
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid blob endpoint {:?}: {}", raw, e)))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }

        Ok(url)
    }

    fn service_url(&self, query: &[(&str, &str)]) -> Result<Url> {
        self.url("", query)
    }

    fn container_url(&self, container: &str, query: &[(&str, &str)]) -> Result<Url> {
        self.url(container, query)
    }

    fn blob_url(&self, container: &str, blob: &str, query: &[(&str, &str)]) -> Result<Url> {
        self.url(&format!("{}/{}", container, blob), query)
    }

    /// Send a request, adding version/date headers and authorization
    async fn send(
        &self,
        method: Method,
        mut url: Url,
        mut headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(X_MS_DATE, header_value(&date)?);
        headers.insert(X_MS_VERSION, HeaderValue::from_static(API_VERSION));

        match &self.connection.credential {
            Credential::SharedKey { account, key } => {
                let auth = signing::authorization(account, key, &method, &url, &headers)?;
                headers.insert(reqwest::header::AUTHORIZATION, header_value(&auth)?);
            }
            Credential::Sas { token } => {
                let query = match url.query() {
                    Some(q) if !q.is_empty() => format!("{}&{}", q, token),
                    _ => token.clone(),
                };
                url.set_query(Some(&query));
            }
        }

        debug!("Azure request: {} {}", method, url.path());

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        Ok(request.send().await?)
    }

    /// Pass a successful response through, turn anything else into an error
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Build an error from a failed response, preferring the service's message
    async fn error_from(response: Response) -> Error {
        let status = response.status();
        let header_code = response
            .headers()
            .get(X_MS_ERROR_CODE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let parsed = xml::parse_error(&body).unwrap_or_default();

        let code = parsed.code.or(header_code);
        let message = parsed
            .message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| code.clone())
            .unwrap_or_else(|| {
                format!(
                    "{} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            });

        Error::Storage {
            status: status.as_u16(),
            code,
            message,
        }
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
        headers.insert(X_MS_BLOB_TYPE, HeaderValue::from_static("BlockBlob"));
        headers.insert(X_MS_BLOB_CONTENT_TYPE, header_value(content_type)?);

        let url = self.blob_url(container, blob, &[])?;
        Self::check(self.send(Method::PUT, url, headers, Some(data)).await?).await?;
        Ok(())
    }

    async fn put_block(&self, container: &str, blob: &str, block_id: &str, data: Vec<u8>) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));

        let url = self.blob_url(container, blob, &[("comp", "block"), ("blockid", block_id)])?;
        Self::check(self.send(Method::PUT, url, headers, Some(data)).await?).await?;
        Ok(())
    }

    async fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
        content_type: &str,
    ) -> Result<()> {
        let body = xml::block_list(block_ids).into_bytes();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        headers.insert(X_MS_BLOB_CONTENT_TYPE, header_value(content_type)?);

        let url = self.blob_url(container, blob, &[("comp", "blocklist")])?;
        Self::check(self.send(Method::PUT, url, headers, Some(body)).await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn kind(&self) -> &'static str {
        "azure"
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![("comp", "list")];
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let url = self.service_url(&query)?;

            let response = Self::check(self.send(Method::GET, url, HeaderMap::new(), None).await?).await?;
            let (page, next) = xml::parse_container_list(&response.text().await?)?;
            names.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(names)
    }

    async fn create_container(&self, container: &str) -> Result<bool> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let url = self.container_url(container, &[("restype", "container")])?;
        let response = self.send(Method::PUT, url, headers, None).await?;

        if response.status() == StatusCode::CREATED {
            return Ok(true);
        }

        let err = Self::error_from(response).await;
        if err.storage_code() == Some("ContainerAlreadyExists") {
            Ok(false)
        } else {
            Err(err)
        }
    }

    async fn delete_container(&self, container: &str) -> Result<bool> {
        let url = self.container_url(container, &[("restype", "container")])?;
        let response = self.send(Method::DELETE, url, HeaderMap::new(), None).await?;

        if response.status().is_success() {
            return Ok(true);
        }

        let err = Self::error_from(response).await;
        if err.storage_code() == Some("ContainerNotFound") {
            Ok(false)
        } else {
            Err(err)
        }
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobDescriptor>> {
        let mut blobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![("restype", "container"), ("comp", "list")];
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let url = self.container_url(container, &query)?;

            let response = Self::check(self.send(Method::GET, url, HeaderMap::new(), None).await?).await?;
            let (page, next) = xml::parse_blob_list(&response.text().await?)?;
            blobs.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(blobs)
    }

    async fn upload_file(
        &self,
        container: &str,
        blob: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<()> {
        validate_blob_name(blob)?;
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        if size <= BLOCK_SIZE as u64 {
            let mut data = Vec::with_capacity(size as usize);
            file.read_to_end(&mut data).await?;
            debug!("Put Blob {}/{} ({} bytes)", container, blob, data.len());
            return self.put_blob(container, blob, data, content_type).await;
        }

        let mut block_ids = Vec::new();
        loop {
            let data = read_block(&mut file).await?;
            if data.is_empty() {
                break;
            }
            // Block ids must all have the same length within a blob.
            let block_id = BASE64_STANDARD.encode(format!("{:08}", block_ids.len()));
            self.put_block(container, blob, &block_id, data).await?;
            block_ids.push(block_id);
        }

        debug!(
            "Put Block List {}/{} ({} blocks, {} bytes)",
            container,
            blob,
            block_ids.len(),
            size
        );
        self.put_block_list(container, blob, &block_ids, content_type).await
    }

    async fn download(&self, container: &str, blob: &str) -> Result<BlobDownload> {
        let url = self.blob_url(container, blob, &[])?;
        let response = Self::check(self.send(Method::GET, url, HeaderMap::new(), None).await?).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content_length = response.content_length();

        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(BlobDownload {
            content_type,
            content_length,
            body: Box::pin(body),
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Internal(format!("invalid header value {:?}: {}", value, e)))
}

/// Read up to one block from the file; an empty buffer means end of file
async fn read_block(file: &mut tokio::fs::File) -> Result<Vec<u8>> {
    let mut data = vec![0u8; BLOCK_SIZE];
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = file.read(&mut data[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    data.truncate(filled);
    Ok(data)
}

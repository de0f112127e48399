//! HTTP API Server
//!
//! REST API over the object store: container management, file listing,
//! uploads and streamed downloads.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::staging::stage_multipart;
use crate::config::WolfBlobConfig;
use crate::error::{Error, Result};
use crate::storage::{BlobDescriptor, ObjectStore};

/// Shared application state
pub struct AppState {
    /// Object store shared by every request
    pub store: Arc<dyn ObjectStore>,
    /// Target container for files, uploads and downloads
    pub container: String,
    /// Where multipart uploads are staged
    pub staging_dir: PathBuf,
}

/// HTTP API server
pub struct HttpServer {
    bind_address: String,
    cors_enabled: bool,
    body_limit: usize,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server around an already constructed store
    pub fn new(config: &WolfBlobConfig, store: Arc<dyn ObjectStore>) -> Self {
        let state = Arc::new(AppState {
            store,
            container: config.storage.container.clone(),
            staging_dir: config.storage.staging_dir.clone(),
        });

        Self {
            bind_address: config.bind_address(),
            cors_enabled: config.server.cors_enabled,
            body_limit: config.max_upload_bytes(),
            state,
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(handle_health))
            // Containers
            .route("/containers", get(handle_list_containers))
            .route("/container/create/:name", post(handle_create_container))
            .route("/container/delete/:name", post(handle_delete_container))
            // Files in the target container
            .route("/files", get(handle_list_files))
            .route("/upload", post(handle_upload))
            .route("/download/:name", get(handle_download))
            .layer(DefaultBodyLimit::max(self.body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        if self.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server; returns after Ctrl+C
    pub async fn start(&self) -> Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "WolfBlob listening on {} (backend: {}, container: {})",
            self.bind_address,
            self.state.store.kind(),
            self.state.container
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

// ============ Response Types ============

/// Plain message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Container listing
#[derive(Debug, Serialize)]
pub struct ContainersResponse {
    pub message: String,
    pub containers: Vec<String>,
}

/// File listing
#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub message: String,
    pub files: Vec<BlobDescriptor>,
}

/// Upload result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_name: String,
    pub container: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub backend: String,
    pub container: String,
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        backend: state.store.kind().to_string(),
        container: state.container.clone(),
    })
}

async fn handle_list_containers(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let containers = state
        .store
        .list_containers()
        .await
        .inspect_err(|e| tracing::error!("Listing containers failed: {}", e))?;

    for name in &containers {
        tracing::debug!("- {}", name);
    }

    Ok(Json(ContainersResponse {
        message: "Containers listed successfully".to_string(),
        containers,
    }))
}

async fn handle_create_container(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let container = name.to_lowercase();

    let created = state
        .store
        .create_container(&container)
        .await
        .inspect_err(|e| tracing::error!("Creating container {} failed: {}", container, e))?;

    if created {
        tracing::info!("Container {} created", container);
        Ok((
            StatusCode::CREATED,
            Json(MessageResponse {
                message: format!("Container {} created.", container),
            }),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("Container {} already exists.", container),
            }),
        ))
    }
}

async fn handle_delete_container(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let container = name.to_lowercase();

    let deleted = state
        .store
        .delete_container(&container)
        .await
        .inspect_err(|e| tracing::error!("Deleting container {} failed: {}", container, e))?;

    if deleted {
        tracing::info!("Container {} deleted", container);
        Ok((
            StatusCode::CREATED,
            Json(MessageResponse {
                message: format!("Container {} deleted.", container),
            }),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("Container {} does not exist.", container),
            }),
        ))
    }
}

async fn handle_list_files(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let files = state
        .store
        .list_blobs(&state.container)
        .await
        .inspect_err(|e| tracing::error!("Listing files in {} failed: {}", state.container, e))?;

    Ok(Json(FilesResponse {
        message: "Files listed successfully".to_string(),
        files,
    }))
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse> {
    let mut multipart = multipart
        .map_err(|e| Error::Upload(e.body_text()))
        .inspect_err(|e| tracing::error!("{}", e))?;

    let staged = stage_multipart(&mut multipart, &state.staging_dir)
        .await
        .inspect_err(|e| tracing::error!("{}", e))?;
    tracing::info!(
        "Upload running: {} ({} bytes, staged at {:?})",
        staged.file_name,
        staged.size,
        staged.path()
    );

    if state
        .store
        .create_container(&state.container)
        .await
        .inspect_err(|e| tracing::error!("Ensuring container {} failed: {}", state.container, e))?
    {
        tracing::info!("Container {} created for upload", state.container);
    }

    state
        .store
        .upload_file(
            &state.container,
            &staged.file_name,
            staged.path(),
            staged.content_type.as_deref(),
        )
        .await
        .inspect_err(|e| tracing::error!("Uploading {} failed: {}", staged.file_name, e))?;

    // The staging file is removed when `staged` drops, on every path.
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            file_name: staged.file_name.clone(),
            container: state.container.clone(),
        }),
    ))
}

/// Streams the blob straight through. Errors before the first byte become a
/// JSON 500; an error mid-stream can only truncate the body.
async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response> {
    tracing::info!("Download running: {}", name);

    let download = state
        .store
        .download(&state.container, &name)
        .await
        .inspect_err(|e| tracing::error!("Downloading {} failed: {}", name, e))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.content_type.as_str());
    if let Some(len) = download.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    let body = download
        .body
        .inspect_err(move |e| tracing::error!("Download of {} aborted mid-stream: {}", name, e));

    builder
        .body(Body::from_stream(body))
        .map_err(|e| Error::Internal(format!("failed to build download response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::storage::MemoryStore;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "wolfblob-test-boundary";

    struct TestServer {
        router: Router,
        store: Arc<MemoryStore>,
        staging: tempfile::TempDir,
    }

    fn test_server() -> TestServer {
        let staging = tempfile::tempdir().unwrap();
        let mut config = WolfBlobConfig::default();
        config.storage.backend = BackendKind::Memory;
        config.storage.staging_dir = staging.path().to_path_buf();

        let store = Arc::new(MemoryStore::new());
        let server = HttpServer::new(&config, store.clone());

        TestServer {
            router: server.router(),
            store,
            staging,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn json_request(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router, request).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn upload(router: &Router, file_name: &str, data: &[u8]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body("file", file_name, "text/plain", data)))
            .unwrap();
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn download(router: &Router, name: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .uri(format!("/download/{}", name))
            .body(Body::empty())
            .unwrap();
        send(router, request).await
    }

    #[tokio::test]
    async fn test_create_container_twice() {
        let server = test_server();

        let (status, json) = json_request(&server.router, "POST", "/container/create/MyBucket").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "Container mybucket created.");

        let (status, json) = json_request(&server.router, "POST", "/container/create/MyBucket").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Container mybucket already exists.");

        let names = server.store.list_containers().await.unwrap();
        assert_eq!(names, vec!["mybucket"]);
    }

    #[tokio::test]
    async fn test_delete_container() {
        let server = test_server();

        let (status, json) = json_request(&server.router, "POST", "/container/delete/Ghost").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Container ghost does not exist.");

        server.store.create_container("archive").await.unwrap();
        let (status, json) = json_request(&server.router, "POST", "/container/delete/ARCHIVE").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "Container archive deleted.");
        assert!(server.store.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_container_name_is_500() {
        let server = test_server();
        let (status, json) = json_request(&server.router, "POST", "/container/create/a_b").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_containers() {
        let server = test_server();
        json_request(&server.router, "POST", "/container/create/alpha").await;
        json_request(&server.router, "POST", "/container/create/beta").await;

        let (status, json) = json_request(&server.router, "GET", "/containers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Containers listed successfully");

        let names: Vec<&str> = json["containers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(names.contains(&"alpha"));
        assert!(names.contains(&"beta"));
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let server = test_server();
        let payload = b"hello from wolfblob\n\x00\x01\x02";

        let (status, json) = upload(&server.router, "greeting.txt", payload).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "File uploaded successfully");
        assert_eq!(json["fileName"], "greeting.txt");
        assert_eq!(json["container"], "development");

        let request = Request::builder()
            .uri("/download/greeting.txt")
            .body(Body::empty())
            .unwrap();
        let response = server.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            payload.len().to_string().as_str()
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_upload_overwrites_same_name() {
        let server = test_server();

        upload(&server.router, "report.csv", b"first").await;
        let (status, _) = upload(&server.router, "report.csv", b"second payload").await;
        assert_eq!(status, StatusCode::CREATED);

        assert_eq!(server.store.blob_count("development"), 1);
        let (status, body) = download(&server.router, "report.csv").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"second payload");
    }

    #[tokio::test]
    async fn test_upload_removes_staging_file() {
        let server = test_server();
        let (status, _) = upload(&server.router, "temp.txt", b"staged").await;
        assert_eq!(status, StatusCode::CREATED);

        let leftover = std::fs::read_dir(server.staging.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_500() {
        let server = test_server();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body("attachment", "a.txt", "text/plain", b"x")))
            .unwrap();

        let (status, body) = send(&server.router, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("no 'file' field"));
    }

    #[tokio::test]
    async fn test_upload_with_empty_file_name_is_500() {
        let server = test_server();

        let (status, json) = upload(&server.router, "", b"orphan").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("has no file name"));
        assert_eq!(server.store.blob_count("development"), 0);
        assert_eq!(std::fs::read_dir(server.staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_without_multipart_is_500() {
        let server = test_server();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, body) = send(&server.router, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_download_missing_is_500() {
        let server = test_server();
        upload(&server.router, "present.txt", b"here").await;

        let (status, body) = download(&server.router, "never-uploaded.txt").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_files() {
        let server = test_server();

        let (status, json) = json_request(&server.router, "GET", "/files").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string());

        upload(&server.router, "one.txt", b"1").await;
        upload(&server.router, "two.txt", b"22").await;

        let (status, json) = json_request(&server.router, "GET", "/files").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Files listed successfully");

        let files = json["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["name"], "one.txt");
        assert_eq!(files[0]["contentType"], "text/plain");
        assert_eq!(files[1]["size"], 2);
        assert!(files[1]["lastModified"].is_string());
    }

    #[tokio::test]
    async fn test_health() {
        let server = test_server();
        let (status, json) = json_request(&server.router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["healthy"], true);
        assert_eq!(json["backend"], "memory");
    }
}

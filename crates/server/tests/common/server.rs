//! Server test utilities.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use depot_core::config::{AppConfig, DefaultStoreConfig, MetadataConfig, StagingConfig};
use depot_metadata::MetadataStore;
use depot_server::{AppState, create_router};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Raw admin token matching `AdminConfig::for_testing()`.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with SQLite metadata and a local default store.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = test_config(&temp_dir);
        modifier(&mut config);

        let metadata = depot_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");
        Self::build(temp_dir, config, metadata).await
    }

    /// Create a test server on top of an existing metadata store.
    pub async fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = test_config(&temp_dir);
        Self::build(temp_dir, config, metadata).await
    }

    async fn build(temp_dir: TempDir, config: AppConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        let default_store = match &config.default_store {
            Some(store) => Some(
                depot_storage::from_config(store)
                    .await
                    .expect("Failed to create default store"),
            ),
            None => None,
        };

        let state = AppState::new(config, metadata, default_store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Root of the temporary directory.
    pub fn path(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Directory of the default store.
    pub fn files_dir(&self) -> PathBuf {
        self._temp_dir.path().join("files")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self._temp_dir.path().join("staging")
    }

    /// Upload `data` as a raw body named `name`. `extra` is appended to the query.
    pub async fn upload_raw(
        &self,
        domain_id: i64,
        name: &str,
        data: impl Into<Bytes>,
        extra: &str,
    ) -> (StatusCode, Value) {
        let uri = format!("/v1/domains/{domain_id}/files?name={name}{extra}");
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/octet-stream")
            .body(Body::from(data.into()))
            .unwrap();
        let (status, _, body) = send(&self.router, request).await;
        (status, to_json(&body))
    }
}

/// Test configuration rooted in `temp_dir`.
fn test_config(temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::for_testing();
    config.default_store = Some(DefaultStoreConfig::Local {
        directory: temp_dir.path().join("files"),
        path_pattern: "$DOMAIN".to_string(),
        expire_day: 0,
    });
    config.staging = StagingConfig {
        directory: temp_dir.path().join("staging"),
    };
    config.metadata = MetadataConfig::Sqlite {
        path: temp_dir.path().join("metadata.db"),
    };
    config.server.instance_id = Some("test-instance".to_string());
    config
}

/// Send a request and collect status, headers and body.
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

#[allow(dead_code)]
pub fn to_json(body: &[u8]) -> Value {
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or(Value::Null)
    }
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let (status, _, body) = send(router, builder.body(body).unwrap()).await;
    (status, to_json(&body))
}

/// GET with an optional Range header.
#[allow(dead_code)]
pub async fn get_range(
    router: &axum::Router,
    uri: &str,
    range: Option<&str>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header("Range", range);
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}

/// Encode `parts` as a multipart/form-data body. Returns (content type, body).
#[allow(dead_code)]
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "depot-test-boundary";
    let mut body = Vec::new();
    for (file_name, content_type, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

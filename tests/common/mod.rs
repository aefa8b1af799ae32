#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use battery_backend::DbPool;
use battery_backend::api::rest::{RestApi, RestApiConfig};
use battery_backend::firmware::FirmwareRegistry;
use battery_backend::telemetry::{
    IngestionPipeline, NotificationDispatcher, NotificationSink, NotifyError, TelemetryStore,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const API_KEY: &str = "test-api-key-0123456789";
pub const MAX_FIRMWARE_SIZE: usize = 1024 * 1024;

pub struct TestApp {
    pub router: axum::Router,
    pub registry: Arc<FirmwareRegistry>,
    pub pool: Arc<DbPool>,
    // Keeps the database and firmware files alive for the whole test.
    _dir: tempfile::TempDir,
}

pub async fn spawn_app(dispatcher: NotificationDispatcher) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("battery.db");
    let pool = battery_backend::init_database(db_path.to_str().unwrap())
        .await
        .unwrap();
    let registry = Arc::new(FirmwareRegistry::new(dir.path().join("firmware")));

    let config = RestApiConfig {
        listen_address: "127.0.0.1:0".parse().unwrap(),
        max_firmware_size: MAX_FIRMWARE_SIZE,
        api_key: API_KEY.to_string(),
        pipeline: IngestionPipeline::new(TelemetryStore::new(pool.clone()), dispatcher),
        registry: registry.clone(),
    };

    TestApp {
        router: RestApi::new(config).router(),
        registry,
        pool,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self.get(uri).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn ingest(&self, payload: Value) -> (StatusCode, Value) {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/ingest")
                    .header("Content-Type", "application/json")
                    .header("x-api-key", API_KEY)
                    .body(Body::from(serde_json::to_string(&payload).unwrap()))
                    .unwrap(),
            )
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        version: &str,
        build: &str,
        release_notes: &str,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(filename, bytes, version, build, release_notes);
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/firmware/upload")
            .header("Content-Type", content_type);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = self.send(builder.body(Body::from(body)).unwrap()).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

pub fn multipart_body(
    filename: &str,
    bytes: &[u8],
    version: &str,
    build: &str,
    release_notes: &str,
) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "----battery-test-boundary";
    let mut body = Vec::new();
    for (name, value) in [("version", version), ("build", build), ("release_notes", release_notes)] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Forwards every delivered message to a channel.
pub struct RecordingSink(pub mpsc::UnboundedSender<String>);

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        let _ = self.0.send(message.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// An endpoint that is always down.
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn recording_dispatcher() -> (NotificationDispatcher, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        NotificationDispatcher::new(Arc::new(RecordingSink(tx)), Duration::from_secs(1)),
        rx,
    )
}

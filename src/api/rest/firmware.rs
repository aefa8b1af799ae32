use crate::api::rest;
use crate::firmware::negotiator::NO_FIRMWARE;
use crate::firmware::registry::binary_filename;
use crate::firmware::{
    FirmwareCheckResponse, FirmwareRecord, FirmwareUpload, RegistryError, negotiate,
};
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::fs;
use tokio_util::io::ReaderStream;

pub const DEFAULT_DEVICE_ID: &str = "battery_monitor_001";

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub current_version: String,
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub firmware_info: FirmwareRecord,
}

#[axum::debug_handler]
pub async fn check_firmware(
    State(api_config): State<rest::RestApiConfig>,
    query: Result<Query<CheckQuery>, QueryRejection>,
) -> Result<Json<FirmwareCheckResponse>, rest::error::ApiError> {
    let Query(query) = query.map_err(rest::error::rejection)?;
    let device = query.device_id.as_deref().unwrap_or(DEFAULT_DEVICE_ID);

    let latest = match api_config.registry.current().await {
        Ok(latest) => latest,
        Err(e) => {
            warn!("Firmware check from {device} could not read registry: {e}");
            return Ok(Json(FirmwareCheckResponse::failed(e)));
        }
    };

    let response = negotiate(latest.as_ref(), &query.current_version);
    info!(
        "Firmware check from {device}: reported {}, update available: {}",
        query.current_version, response.update_available
    );
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn get_firmware_info(
    State(api_config): State<rest::RestApiConfig>,
) -> Result<Json<FirmwareRecord>, rest::error::ApiError> {
    match api_config.registry.current().await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(rest::error::client_error(
            StatusCode::NOT_FOUND,
            NO_FIRMWARE.to_string(),
        )),
        Err(e) => Err(rest::error::internal_error(e)),
    }
}

#[axum::debug_handler]
pub async fn upload_firmware(
    State(api_config): State<rest::RestApiConfig>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, rest::error::ApiError> {
    let mut in_filename: Option<String> = None;
    let mut in_version: Option<String> = None;
    let mut in_build: Option<String> = None;
    let mut in_release_notes: Option<String> = None;
    let mut in_file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(rest::error::rejection)?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                in_filename = field.file_name().map(str::to_string);
                in_file_bytes = Some(field.bytes().await.map_err(rest::error::rejection)?.to_vec());
            }
            "version" => {
                in_version = Some(field.text().await.map_err(rest::error::rejection)?);
            }
            "build" => {
                in_build = Some(field.text().await.map_err(rest::error::rejection)?);
            }
            "release_notes" => {
                in_release_notes = Some(field.text().await.map_err(rest::error::rejection)?);
            }
            _ => {}
        }
    }

    // Basic validation

    let Some(file) = in_file_bytes else {
        return Err(rest::error::client_error(
            StatusCode::BAD_REQUEST,
            "firmware file required".to_string(),
        ));
    };

    let build = match in_build.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            rest::error::client_error(StatusCode::BAD_REQUEST, format!("invalid build '{raw}'"))
        })?,
    };

    let upload = FirmwareUpload::new(
        in_filename.as_deref().unwrap_or(""),
        in_version.map(|v| v.trim().to_string()).unwrap_or_default(),
        build,
        in_release_notes.unwrap_or_default(),
        file,
    )
    .map_err(|e| match e {
        RegistryError::InvalidUpload(msg) => {
            rest::error::client_error(StatusCode::BAD_REQUEST, msg)
        }
        other => rest::error::internal_error(other),
    })?;

    let record = api_config
        .registry
        .publish(upload)
        .await
        .map_err(rest::error::internal_error)?;

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: format!("Firmware v{} uploaded successfully", record.version),
        firmware_info: record,
    }))
}

#[axum::debug_handler]
pub async fn download_firmware(
    State(api_config): State<rest::RestApiConfig>,
    Path(version): Path<String>,
) -> Result<impl IntoResponse, rest::error::ApiError> {
    let not_found = || rest::error::client_error(StatusCode::NOT_FOUND, "Firmware not found".to_string());

    let Some(path) = api_config.registry.binary_path(&version) else {
        return Err(not_found());
    };

    // Open file
    let file = match fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(rest::error::internal_error(e)),
    };
    let size = file
        .metadata()
        .await
        .map_err(rest::error::internal_error)?
        .len();

    // Stream the file to the client
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    // Prepare headers
    let mut headers = HeaderMap::new();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/octet-stream"),
    );
    let filename = binary_filename(&version);
    headers.insert(
        "Content-Disposition",
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)).map_err(|_| {
            rest::error::internal_error(rest::error::client_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to set Content-Disposition header".to_string(),
            ))
        })?,
    );
    headers.insert("Content-Length", HeaderValue::from(size));

    Ok((headers, body))
}

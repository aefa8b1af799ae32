use crate::api::rest;
use crate::telemetry::IngestError;
use crate::telemetry::model::{IngestResponse, ReadingOut, TelemetrySample};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

pub const DEFAULT_READINGS_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    pub limit: Option<i64>,
}

#[axum::debug_handler]
pub async fn ingest(
    State(api_config): State<rest::RestApiConfig>,
    payload: Result<Json<TelemetrySample>, JsonRejection>,
) -> Result<Json<IngestResponse>, rest::error::ApiError> {
    let Json(sample) = payload.map_err(rest::error::rejection)?;

    match api_config.pipeline.ingest(sample).await {
        Ok(receipt) => Ok(Json(IngestResponse::ok(receipt.id))),
        Err(IngestError::Invalid(msg)) => Err(rest::error::client_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            msg,
        )),
        Err(IngestError::Store(e)) => Err(rest::error::internal_error(e)),
    }
}

#[axum::debug_handler]
pub async fn list_readings(
    State(api_config): State<rest::RestApiConfig>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<Vec<ReadingOut>>, rest::error::ApiError> {
    let Query(query) = query.map_err(rest::error::rejection)?;
    let limit = query.limit.unwrap_or(DEFAULT_READINGS_LIMIT);

    let rows = api_config
        .pipeline
        .store()
        .recent(limit)
        .await
        .map_err(rest::error::internal_error)?;

    Ok(Json(rows.into_iter().map(ReadingOut::from).collect()))
}

#[axum::debug_handler]
pub async fn latest_reading(
    State(api_config): State<rest::RestApiConfig>,
) -> Result<Json<Option<ReadingOut>>, rest::error::ApiError> {
    let latest = api_config
        .pipeline
        .store()
        .latest()
        .await
        .map_err(rest::error::internal_error)?;

    Ok(Json(latest.map(ReadingOut::from)))
}

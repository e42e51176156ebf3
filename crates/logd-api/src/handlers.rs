//! ---
//! logd_section: "05-networking-external-interfaces"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Route handlers for ingestion, queries, liveness, and metrics."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use logd_common::IngestChannel;
use logd_schema::LogRecord;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{ApiError, ApiState};

const SAVED: &str = "Log saved successfully";
const NO_LOGS_FOR_SERVICE: &str = "No logs found for the service";
const NO_LOGS: &str = "No logs found";

#[derive(Debug, Serialize)]
pub(crate) struct SaveResponse {
    message: &'static str,
    #[serde(rename = "_id")]
    id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceQuery {
    service_name: Option<String>,
}

pub(crate) async fn post_log(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let record = state
        .ingestor()
        .ingest_bytes(IngestChannel::Http, &body)
        .await?;
    info!(id = %record.id, service_name = %record.service_name, "log saved");
    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            message: SAVED,
            id: record.id,
        }),
    ))
}

pub(crate) async fn get_logs_by_service(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ServiceQuery>,
) -> Result<Response, ApiError> {
    let service_name = query
        .service_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing service name"))?;

    let records = state
        .ingestor()
        .store()
        .query_by_service(&service_name)
        .await
        .map_err(|err| {
            error!(%service_name, error = %err, "failed to fetch logs");
            ApiError::internal("Failed to fetch logs")
        })?;
    Ok(records_response(records, NO_LOGS_FOR_SERVICE))
}

pub(crate) async fn get_all_logs(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let records = state.ingestor().store().query_all().await.map_err(|err| {
        error!(error = %err, "failed to fetch logs");
        ApiError::internal("Failed to fetch logs")
    })?;
    Ok(records_response(records, NO_LOGS))
}

fn records_response(records: Vec<LogRecord>, empty_message: &'static str) -> Response {
    if records.is_empty() {
        return (StatusCode::OK, empty_message).into_response();
    }
    (StatusCode::OK, Json(records)).into_response()
}

pub(crate) async fn ping() -> &'static str {
    "."
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let (content_type, body) = state.ingestor().metrics().encode().map_err(|err| {
        error!(error = %err, "failed to encode metrics");
        ApiError::internal("Failed to encode metrics")
    })?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

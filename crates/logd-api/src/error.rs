//! ---
//! logd_section: "05-networking-external-interfaces"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Error responses returned by the HTTP API."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use logd_persistence::IngestError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Handler failure rendered as `{"message": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Decode(err) => Self::bad_request(format!("Invalid request body: {err}")),
            IngestError::Validation(err) => Self::bad_request(format!("Invalid log entry: {err}")),
            IngestError::Store(_) => Self::internal("Failed to save log"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Log record schema, payload decoding, and normalization."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::{LogPayload, LogRecord};

/// Millisecond precision, the native resolution of document-store dates.
const TIMESTAMP_PRECISION: u16 = 3;

/// Raised when a decoded payload lacks a required field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is absent, empty, or whitespace only.
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),
}

/// Turn a payload into a record stamped with the current time.
pub fn normalize(payload: LogPayload) -> Result<LogRecord, ValidationError> {
    normalize_at(payload, Utc::now())
}

/// Turn a payload into a record using `now` as the ingestion instant.
///
/// A fresh identifier is always assigned. `created_at` is always `now`;
/// the event timestamp falls back to the same instant only when the producer
/// did not supply one.
pub fn normalize_at(payload: LogPayload, now: DateTime<Utc>) -> Result<LogRecord, ValidationError> {
    let service_name = required("service_name", payload.service_name)?;
    let message = required("log_message", payload.log_message)?;

    let created_at = now.trunc_subsecs(TIMESTAMP_PRECISION);
    let event_timestamp = payload
        .timestamp
        .map(|ts| ts.trunc_subsecs(TIMESTAMP_PRECISION))
        .unwrap_or(created_at);

    Ok(LogRecord {
        id: Uuid::new_v4(),
        service_name,
        message,
        event_timestamp,
        created_at,
    })
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField(field)),
    }
}

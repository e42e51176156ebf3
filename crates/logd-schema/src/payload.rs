//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Log record schema, payload decoding, and normalization."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Raised when inbound bytes cannot be turned into a [`LogPayload`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The body is not valid JSON or a known field has the wrong type.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The body is valid JSON but not an object.
    #[error("payload must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Untrusted log entry as submitted by a producer.
///
/// Every field is optional here; requiredness is enforced by the normalizer.
/// JSON `null` is treated the same as an absent field and unknown fields
/// (including any client-supplied `_id` or `created_at`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogPayload {
    /// Producing system.
    #[serde(default)]
    pub service_name: Option<String>,
    /// Log text.
    #[serde(default)]
    pub log_message: Option<String>,
    /// Producer event time (RFC 3339).
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogPayload {
    /// Decode a JSON document into a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Convenience constructor used by producers and tests.
    pub fn new(service_name: impl Into<String>, log_message: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            log_message: Some(log_message.into()),
            timestamp: None,
        }
    }

    /// Attach a producer event time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

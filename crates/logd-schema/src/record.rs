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
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical persisted log entry.
///
/// Field names on the wire (`_id`, `service_name`, `log_message`, `timestamp`,
/// `created_at`) are part of the external contract and shared by every store
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Identifier assigned at ingestion time.
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Producing system; the only filter key on read.
    pub service_name: String,
    /// Free-form log payload.
    #[serde(rename = "log_message")]
    pub message: String,
    /// Producer-supplied event time, or the ingestion time when absent.
    #[serde(rename = "timestamp")]
    pub event_timestamp: DateTime<Utc>,
    /// Server-observed arrival time.
    pub created_at: DateTime<Utc>,
}

/// Order records by arrival time, breaking ties on the identifier.
///
/// Every store returns query results in this order.
pub fn sort_records(records: &mut [LogRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(service: &str, created_secs: i64) -> LogRecord {
        let created_at = Utc.timestamp_opt(created_secs, 0).unwrap();
        LogRecord {
            id: Uuid::new_v4(),
            service_name: service.into(),
            message: "hello".into(),
            event_timestamp: created_at,
            created_at,
        }
    }

    #[test]
    fn serializes_with_external_field_names() {
        let rec = record("auth", 1_700_000_000);
        let value = serde_json::to_value(&rec).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["_id", "created_at", "log_message", "service_name", "timestamp"]
        );
        assert_eq!(object["service_name"], "auth");
        assert_eq!(object["_id"], rec.id.to_string());
    }

    #[test]
    fn sort_orders_by_created_at() {
        let mut records = vec![record("a", 30), record("b", 10), record("c", 20)];
        sort_records(&mut records);
        let services: Vec<_> = records.iter().map(|r| r.service_name.as_str()).collect();
        assert_eq!(services, vec!["b", "c", "a"]);
    }
}

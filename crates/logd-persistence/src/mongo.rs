//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "MongoDB-backed log store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use logd_common::MongoConfig;
use logd_schema::{sort_records, LogRecord};
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::LogStore;
use crate::{Result, StoreError};

/// Document layout inside the collection. Dates are native BSON datetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogDocument {
    #[serde(rename = "_id")]
    id: String,
    service_name: String,
    log_message: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    timestamp: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl From<&LogRecord> for LogDocument {
    fn from(record: &LogRecord) -> Self {
        Self {
            id: record.id.to_string(),
            service_name: record.service_name.clone(),
            log_message: record.message.clone(),
            timestamp: record.event_timestamp,
            created_at: record.created_at,
        }
    }
}

impl TryFrom<LogDocument> for LogRecord {
    type Error = StoreError;

    fn try_from(document: LogDocument) -> Result<Self> {
        let id = Uuid::parse_str(&document.id).map_err(|err| {
            StoreError::Serialization(format!("document _id {:?} is not a uuid: {err}", document.id))
        })?;
        Ok(LogRecord {
            id,
            service_name: document.service_name,
            message: document.log_message,
            event_timestamp: document.timestamp,
            created_at: document.created_at,
        })
    }
}

/// Store backed by a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<LogDocument>,
}

impl MongoStore {
    /// Connect using `config` and verify the deployment answers `ping`.
    pub async fn connect(
        config: &MongoConfig,
        app_name: &str,
        server_selection_timeout: Duration,
    ) -> Result<Self> {
        let mut options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(unavailable)?;
        options.app_name = Some(app_name.to_owned());
        options.server_selection_timeout = Some(server_selection_timeout);
        if let Some(username) = &config.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(config.password.as_ref().map(|secret| secret.expose().to_owned()))
                    .source(config.auth_source.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(unavailable)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(unavailable)?;
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            collection = %config.collection,
            "connected to mongodb"
        );

        let collection = client
            .database(&config.database)
            .collection::<LogDocument>(&config.collection);
        Ok(Self { collection })
    }

    async fn find(&self, filter: Document) -> Result<Vec<LogRecord>> {
        let cursor = self
            .collection
            .find(filter, None)
            .await
            .map_err(unavailable)?;
        let documents: Vec<LogDocument> = cursor.try_collect().await.map_err(unavailable)?;
        let mut records = documents
            .into_iter()
            .map(LogRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        sort_records(&mut records);
        Ok(records)
    }
}

fn unavailable(err: mongodb::error::Error) -> StoreError {
    use mongodb::error::ErrorKind;
    match *err.kind {
        ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => {
            StoreError::Serialization(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl LogStore for MongoStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        let document = LogDocument::from(record);
        self.collection
            .insert_one(&document, None)
            .await
            .map_err(unavailable)?;
        debug!(id = %record.id, "inserted log document");
        Ok(())
    }

    async fn query_by_service(&self, service_name: &str) -> Result<Vec<LogRecord>> {
        self.find(doc! { "service_name": service_name }).await
    }

    async fn query_all(&self) -> Result<Vec<LogRecord>> {
        self.find(Document::new()).await
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logd_schema::{normalize_at, LogPayload};

    #[test]
    fn document_uses_wire_field_names() {
        let now = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let record = normalize_at(LogPayload::new("auth", "login ok"), now).unwrap();
        let document = bson::to_document(&LogDocument::from(&record)).unwrap();

        assert_eq!(document.get_str("_id").unwrap(), record.id.to_string());
        assert_eq!(document.get_str("service_name").unwrap(), "auth");
        assert_eq!(document.get_str("log_message").unwrap(), "login ok");
        let created = document.get_datetime("created_at").unwrap();
        assert_eq!(created.timestamp_millis(), now.timestamp_millis());
        assert!(document.get_datetime("timestamp").is_ok());
    }

    #[test]
    fn document_converts_back_to_record() {
        let record = normalize_at(LogPayload::new("billing", "paid"), Utc::now()).unwrap();
        let document: LogDocument =
            bson::from_document(bson::to_document(&LogDocument::from(&record)).unwrap()).unwrap();
        assert_eq!(LogRecord::try_from(document).unwrap(), record);
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let document = LogDocument {
            id: "65f0c2a1e4b0a1b2c3d4e5f6".into(),
            service_name: "legacy".into(),
            log_message: "hello".into(),
            timestamp: Utc::now(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            LogRecord::try_from(document),
            Err(StoreError::Serialization(_))
        ));
    }
}

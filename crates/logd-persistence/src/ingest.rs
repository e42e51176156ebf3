//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Decode, normalize, and persist path shared by both ingestion channels."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::sync::Arc;
use std::time::Instant;

use logd_common::{IngestChannel, IngestMetrics};
use logd_schema::{normalize, DecodeError, LogPayload, LogRecord, ValidationError};
use tracing::{debug, warn};

use crate::store::LogStore;
use crate::StoreError;

/// Why an inbound entry did not become a stored record.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The raw bytes were not a well-formed payload.
    #[error("invalid payload: {0}")]
    Decode(#[from] DecodeError),
    /// The payload lacked a required field.
    #[error("invalid log entry: {0}")]
    Validation(#[from] ValidationError),
    /// The store refused or failed the write.
    #[error("failed to persist log record: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Label used for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode",
            IngestError::Validation(_) => "validation",
            IngestError::Store(_) => "store",
        }
    }
}

/// Shared entry point for the HTTP handlers and the queue consumer.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn LogStore>,
    metrics: IngestMetrics,
}

impl Ingestor {
    /// Create an ingestor writing into `store`.
    pub fn new(store: Arc<dyn LogStore>, metrics: IngestMetrics) -> Self {
        Self { store, metrics }
    }

    /// Underlying store, for the read path.
    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Counters updated by this ingestor.
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Decode `bytes` and ingest the resulting payload.
    pub async fn ingest_bytes(
        &self,
        channel: IngestChannel,
        bytes: &[u8],
    ) -> Result<LogRecord, IngestError> {
        let payload = match LogPayload::decode(bytes) {
            Ok(payload) => payload,
            Err(err) => return Err(self.reject(channel, err.into())),
        };
        self.ingest(channel, payload).await
    }

    /// Normalize `payload` and append it. The store is never called when
    /// normalization fails.
    pub async fn ingest(
        &self,
        channel: IngestChannel,
        payload: LogPayload,
    ) -> Result<LogRecord, IngestError> {
        let record = match normalize(payload) {
            Ok(record) => record,
            Err(err) => return Err(self.reject(channel, err.into())),
        };

        let started = Instant::now();
        if let Err(err) = self.store.append(&record).await {
            self.metrics.record_store_failure(channel);
            warn!(
                %channel,
                backend = self.store.backend(),
                id = %record.id,
                service_name = %record.service_name,
                error = %err,
                "failed to persist log record"
            );
            return Err(err.into());
        }
        self.metrics
            .record_ingested(channel, started.elapsed().as_secs_f64());
        debug!(%channel, id = %record.id, service_name = %record.service_name, "log record stored");
        Ok(record)
    }

    fn reject(&self, channel: IngestChannel, err: IngestError) -> IngestError {
        self.metrics.record_rejected(channel, err.reason());
        debug!(%channel, error = %err, "log entry rejected");
        err
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("backend", &self.store.backend())
            .finish()
    }
}

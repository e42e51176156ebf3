//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Store adapters and the shared ingestion path."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
#![warn(missing_docs)]
//! Persistence for log records.
//!
//! Every backend implements [`LogStore`]. [`connect_store`] builds the backend
//! named in the configuration and wraps it in a [`TimeoutStore`].

use std::sync::Arc;
use std::time::Duration;

use logd_common::{StoreBackend, StoreConfig};
use tracing::info;

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A record could not be encoded for, or decoded from, the backend.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Local file access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The operation did not finish within the configured bound.
    #[error("store {operation} timed out after {after:?}")]
    Timeout {
        /// Name of the store operation.
        operation: &'static str,
        /// Configured bound that elapsed.
        after: Duration,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub mod file;
pub mod ingest;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod store;
pub mod timeout;

pub use file::FileStore;
pub use ingest::{IngestError, Ingestor};
pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
pub use store::LogStore;
pub use timeout::TimeoutStore;

/// Build the configured backend, verify it is reachable, and bound every call
/// with `config.operation_timeout`.
pub async fn connect_store(config: &StoreConfig, app_name: &str) -> Result<Arc<dyn LogStore>> {
    let backend: Arc<dyn LogStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::open(&config.file.path).await?),
        StoreBackend::Mongodb => connect_mongo(config, app_name).await?,
    };
    info!(
        backend = ?config.backend,
        timeout = ?config.operation_timeout,
        "log store ready"
    );
    Ok(Arc::new(TimeoutStore::new(backend, config.operation_timeout)))
}

#[cfg(feature = "mongodb")]
async fn connect_mongo(config: &StoreConfig, app_name: &str) -> Result<Arc<dyn LogStore>> {
    let connect = MongoStore::connect(&config.mongodb, app_name, config.operation_timeout);
    match tokio::time::timeout(config.operation_timeout, connect).await {
        Ok(store) => Ok(Arc::new(store?)),
        Err(_) => Err(StoreError::Timeout {
            operation: "connect",
            after: config.operation_timeout,
        }),
    }
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongo(_config: &StoreConfig, _app_name: &str) -> Result<Arc<dyn LogStore>> {
    Err(StoreError::Unavailable(
        "mongodb backend requested but logd-persistence was built without the `mongodb` feature"
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_names_operation() {
        let err = StoreError::Timeout {
            operation: "append",
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "store append timed out after 5s");
    }

    #[tokio::test]
    async fn connect_memory_backend() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = connect_store(&config, "logd-test").await.unwrap();
        assert!(store.query_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connect_file_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig {
            backend: StoreBackend::File,
            ..StoreConfig::default()
        };
        config.file.path = dir.path().join("nested/logs.jsonl");
        connect_store(&config, "logd-test").await.unwrap();
        assert!(config.file.path.exists());
    }
}

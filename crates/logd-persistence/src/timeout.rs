//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Bounded-latency wrapper around any log store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logd_schema::LogRecord;
use tracing::warn;

use crate::store::LogStore;
use crate::{Result, StoreError};

/// Fails any call on the inner store that runs longer than `limit`.
///
/// An expired append may still complete on the backend; the caller only
/// learns that it did not finish in time.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: Arc<dyn LogStore>,
    limit: Duration,
}

impl TimeoutStore {
    /// Wrap `inner`, bounding each call by `limit`.
    pub fn new(inner: Arc<dyn LogStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// Configured bound.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.inner.backend(),
                    operation,
                    limit = ?self.limit,
                    "store call timed out"
                );
                Err(StoreError::Timeout {
                    operation,
                    after: self.limit,
                })
            }
        }
    }
}

#[async_trait]
impl LogStore for TimeoutStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        self.bounded("append", self.inner.append(record)).await
    }

    async fn query_by_service(&self, service_name: &str) -> Result<Vec<LogRecord>> {
        self.bounded("query_by_service", self.inner.query_by_service(service_name))
            .await
    }

    async fn query_all(&self) -> Result<Vec<LogRecord>> {
        self.bounded("query_all", self.inner.query_all()).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use logd_schema::{normalize, LogPayload};

    struct StalledStore;

    #[async_trait]
    impl LogStore for StalledStore {
        async fn append(&self, _record: &LogRecord) -> Result<()> {
            std::future::pending().await
        }

        async fn query_by_service(&self, _service_name: &str) -> Result<Vec<LogRecord>> {
            std::future::pending().await
        }

        async fn query_all(&self) -> Result<Vec<LogRecord>> {
            std::future::pending().await
        }

        fn backend(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_calls_surface_timeout() {
        let store = TimeoutStore::new(Arc::new(StalledStore), Duration::from_secs(5));
        let record = normalize(LogPayload::new("auth", "login ok")).unwrap();

        let err = store.append(&record).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout { operation: "append", after } if after == Duration::from_secs(5)
        ));
        assert!(matches!(
            store.query_all().await,
            Err(StoreError::Timeout { operation: "query_all", .. })
        ));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let store = TimeoutStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let record = normalize(LogPayload::new("auth", "login ok")).unwrap();
        store.append(&record).await.unwrap();
        assert_eq!(store.query_by_service("auth").await.unwrap(), vec![record]);
        assert_eq!(store.backend(), "memory");
    }
}

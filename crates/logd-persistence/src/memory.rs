//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Process-local log store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use async_trait::async_trait;
use logd_schema::{sort_records, LogRecord};
use parking_lot::RwLock;

use crate::store::LogStore;
use crate::Result;

/// Store backed by a vector in process memory. Contents vanish on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn collect<F>(&self, keep: F) -> Vec<LogRecord>
    where
        F: Fn(&LogRecord) -> bool,
    {
        let mut records: Vec<LogRecord> = self
            .records
            .read()
            .iter()
            .filter(|record| keep(record))
            .cloned()
            .collect();
        sort_records(&mut records);
        records
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn query_by_service(&self, service_name: &str) -> Result<Vec<LogRecord>> {
        Ok(self.collect(|record| record.service_name == service_name))
    }

    async fn query_all(&self) -> Result<Vec<LogRecord>> {
        Ok(self.collect(|_| true))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logd_schema::{normalize, LogPayload};

    #[tokio::test]
    async fn filters_by_exact_service_name() {
        let store = MemoryStore::new();
        for service in ["auth", "Auth", "billing", "auth"] {
            let record = normalize(LogPayload::new(service, "event")).unwrap();
            store.append(&record).await.unwrap();
        }
        assert_eq!(store.len(), 4);
        assert_eq!(store.query_by_service("auth").await.unwrap().len(), 2);
        assert_eq!(store.query_by_service("Auth").await.unwrap().len(), 1);
        assert!(store.query_by_service("missing").await.unwrap().is_empty());
    }
}

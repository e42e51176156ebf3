//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Store adapter trait shared by every backend."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use async_trait::async_trait;
use logd_schema::LogRecord;

use crate::Result;

/// Durable home for [`LogRecord`]s.
///
/// Implementations must be safe for concurrent use: the HTTP handlers and the
/// queue consumer call into the same instance without extra locking. Query
/// results are sorted ascending by `created_at`, ties broken by `_id`.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist a single record. Returns only once the write is durable for
    /// this backend.
    async fn append(&self, record: &LogRecord) -> Result<()>;

    /// All records whose `service_name` equals `service_name` exactly.
    async fn query_by_service(&self, service_name: &str) -> Result<Vec<LogRecord>>;

    /// Every stored record.
    async fn query_all(&self) -> Result<Vec<LogRecord>>;

    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;
}

//! ---
//! logd_section: "01-core-functionality"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Shared primitives and utilities for the logd runtime."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
//! Core shared primitives for the logd workspace.
//! This crate exposes configuration loading, tracing bootstrap, and the
//! ingestion counters consumed by both ingestion channels.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{
    AmqpConfig, ApiConfig, AppConfig, ConfigError, FileStoreConfig, LoadedAppConfig,
    LoggingConfig, MongoConfig, QueueBackend, QueueConfig, Secret, ServiceConfig, StoreBackend,
    StoreConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{IngestChannel, IngestMetrics};

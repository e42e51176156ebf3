//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Log record schema, payload decoding, and normalization."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
//! Schema definitions shared by both ingestion channels.
//!
//! Inbound bytes are decoded into a [`LogPayload`] (untrusted, every field
//! optional) and then turned into a canonical [`LogRecord`] by
//! [`normalize`]. Only the normalizer creates records, which keeps identity and
//! arrival-time assignment in one place regardless of where the entry came from.
#![warn(missing_docs)]

pub mod normalize;
pub mod payload;
pub mod record;

pub use normalize::{normalize, normalize_at, ValidationError};
pub use payload::{DecodeError, LogPayload};
pub use record::{sort_records, LogRecord};

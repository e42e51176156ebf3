//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Queue subscriptions and the consumer loop draining them into the store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
#![warn(missing_docs)]
//! Queue ingestion for logd.

use std::sync::Arc;

use logd_common::{QueueBackend, QueueConfig};

pub mod consumer;
pub mod memory;
pub mod transport;

#[cfg(feature = "amqp")]
pub mod amqp;

/// Shared result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by queue transports and the consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker could not be reached or the subscription could not be set up.
    #[error("failed to subscribe to queue {queue}: {reason}")]
    Connect {
        /// Queue being subscribed to.
        queue: String,
        /// Transport-specific detail.
        reason: String,
    },
    /// An established subscription failed. Fatal to the process.
    #[error("lost connection to queue {queue}: {reason}")]
    ConnectionLost {
        /// Queue that was being consumed.
        queue: String,
        /// Transport-specific detail.
        reason: String,
    },
    /// The requested backend is not compiled in or is disabled.
    #[error("queue backend unavailable: {0}")]
    Unsupported(String),
}

pub use consumer::{ConsumerHandle, ConsumerLoop, ConsumerState, ConsumerStats};
pub use memory::{AckLog, InMemoryQueue, QueuePublisher};
pub use transport::{MessageAcker, QueueMessage, Subscription, SubscriptionSource};

#[cfg(feature = "amqp")]
pub use amqp::AmqpSource;

/// Build the subscription source named in `config`.
///
/// Returns `Ok(None)` when queue ingestion is disabled.
pub fn queue_source(
    config: &QueueConfig,
    app_name: &str,
) -> Result<Option<Arc<dyn SubscriptionSource>>> {
    match config.backend {
        QueueBackend::Disabled => Ok(None),
        QueueBackend::Amqp => amqp_source(config, app_name).map(Some),
    }
}

#[cfg(feature = "amqp")]
fn amqp_source(config: &QueueConfig, app_name: &str) -> Result<Arc<dyn SubscriptionSource>> {
    Ok(Arc::new(AmqpSource::new(
        config.amqp.clone(),
        config.name.clone(),
        app_name,
    )))
}

#[cfg(not(feature = "amqp"))]
fn amqp_source(_config: &QueueConfig, _app_name: &str) -> Result<Arc<dyn SubscriptionSource>> {
    Err(QueueError::Unsupported(
        "amqp backend requested but logd-msg was built without the `amqp` feature".into(),
    ))
}

//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Transport-neutral subscription abstractions."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use async_trait::async_trait;

use crate::Result;

/// Acknowledges a single delivery to the broker.
#[async_trait]
pub trait MessageAcker: Send + Sync {
    /// Positively acknowledge the delivery.
    async fn ack(&self) -> Result<()>;
}

/// One delivery taken off a queue.
pub struct QueueMessage {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Broker-assigned tag, unique within the subscription.
    pub delivery_tag: u64,
    /// `None` when the broker acknowledged the delivery on send.
    pub acker: Option<Box<dyn MessageAcker>>,
}

impl QueueMessage {
    /// Message the broker has already acknowledged.
    pub fn auto_acked(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            delivery_tag,
            acker: None,
        }
    }
}

impl std::fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMessage")
            .field("delivery_tag", &self.delivery_tag)
            .field("len", &self.body.len())
            .field("needs_ack", &self.acker.is_some())
            .finish()
    }
}

/// An active subscription to one queue.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery.
    ///
    /// `None` means the broker ended the subscription cleanly; an error means
    /// the connection is gone and no more messages will arrive.
    async fn next_message(&mut self) -> Option<Result<QueueMessage>>;
}

/// Opens subscriptions to a named queue.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Connect and start consuming.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>>;
    /// Queue this source consumes from.
    fn queue_name(&self) -> &str;
    /// Short transport name used in logs.
    fn transport(&self) -> &'static str;
}

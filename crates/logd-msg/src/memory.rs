//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "In-process queue used by tests and single-binary runs."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::{MessageAcker, QueueMessage, Subscription, SubscriptionSource};
use crate::{QueueError, Result};

enum Delivery {
    Body(Vec<u8>),
    Fault(String),
}

/// Delivery tags acknowledged on an [`InMemoryQueue`], in call order.
///
/// Holding one does not keep the queue open.
#[derive(Clone, Default)]
pub struct AckLog(Arc<Mutex<Vec<u64>>>);

impl AckLog {
    /// Tags recorded so far.
    pub fn tags(&self) -> Vec<u64> {
        self.0.lock().clone()
    }

    fn push(&self, delivery_tag: u64) {
        self.0.lock().push(delivery_tag);
    }
}

/// Unbounded in-process queue. Supports a single subscription.
///
/// Deliveries carry an acker so callers can observe when each one was
/// acknowledged. Nothing is ever redelivered.
pub struct InMemoryQueue {
    name: String,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    acks: AckLog,
}

/// Producer half of an [`InMemoryQueue`]. Dropping every publisher ends the
/// subscription cleanly.
#[derive(Clone)]
pub struct QueuePublisher {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl InMemoryQueue {
    /// Create a queue named `name` and its publisher.
    pub fn new(name: impl Into<String>) -> (Self, QueuePublisher) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let acks = AckLog::default();
        let queue = Self {
            name: name.into(),
            receiver: Mutex::new(Some(receiver)),
            acks,
        };
        (queue, QueuePublisher { sender })
    }

    /// Handle on the acknowledgements this queue records.
    pub fn ack_log(&self) -> AckLog {
        self.acks.clone()
    }
}

impl QueuePublisher {
    /// Enqueue a message body. Returns `false` once the subscription is gone.
    pub fn publish(&self, body: impl Into<Vec<u8>>) -> bool {
        self.sender.send(Delivery::Body(body.into())).is_ok()
    }

    /// Make the subscription fail as if the broker connection dropped.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.sender.send(Delivery::Fault(reason.into())).is_ok()
    }
}

#[async_trait]
impl SubscriptionSource for InMemoryQueue {
    async fn subscribe(&self) -> Result<Box<dyn Subscription>> {
        let receiver = self.receiver.lock().take().ok_or_else(|| QueueError::Connect {
            queue: self.name.clone(),
            reason: "in-memory queue already has a subscriber".into(),
        })?;
        Ok(Box::new(MemorySubscription {
            queue: self.name.clone(),
            receiver,
            next_tag: 0,
            acks: self.acks.clone(),
        }))
    }

    fn queue_name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> &'static str {
        "in_memory"
    }
}

struct MemorySubscription {
    queue: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    next_tag: u64,
    acks: AckLog,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Option<Result<QueueMessage>> {
        match self.receiver.recv().await? {
            Delivery::Body(body) => {
                self.next_tag += 1;
                Some(Ok(QueueMessage {
                    body,
                    delivery_tag: self.next_tag,
                    acker: Some(Box::new(MemoryAcker {
                        delivery_tag: self.next_tag,
                        acks: self.acks.clone(),
                    })),
                }))
            }
            Delivery::Fault(reason) => Some(Err(QueueError::ConnectionLost {
                queue: self.queue.clone(),
                reason,
            })),
        }
    }
}

struct MemoryAcker {
    delivery_tag: u64,
    acks: AckLog,
}

#[async_trait]
impl MessageAcker for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.acks.push(self.delivery_tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_then_ends() {
        let (queue, publisher) = InMemoryQueue::new("log_queue");
        let mut subscription = queue.subscribe().await.unwrap();
        assert!(publisher.publish("one"));
        assert!(publisher.publish("two"));
        drop(publisher);

        let first = subscription.next_message().await.unwrap().unwrap();
        let second = subscription.next_message().await.unwrap().unwrap();
        assert_eq!((first.delivery_tag, first.body.as_slice()), (1, &b"one"[..]));
        assert_eq!((second.delivery_tag, second.body.as_slice()), (2, &b"two"[..]));
        assert!(subscription.next_message().await.is_none());
    }

    #[tokio::test]
    async fn ack_log_does_not_hold_the_queue_open() {
        let (queue, publisher) = InMemoryQueue::new("log_queue");
        let acks = queue.ack_log();
        let mut subscription = queue.subscribe().await.unwrap();
        publisher.publish("only");
        drop(publisher);

        let message = subscription.next_message().await.unwrap().unwrap();
        message.acker.unwrap().ack().await.unwrap();
        assert!(subscription.next_message().await.is_none());
        assert_eq!(acks.tags(), vec![1]);
    }

    #[tokio::test]
    async fn fault_surfaces_as_connection_lost() {
        let (queue, publisher) = InMemoryQueue::new("log_queue");
        let mut subscription = queue.subscribe().await.unwrap();
        publisher.fail("broker went away");
        let err = subscription.next_message().await.unwrap().unwrap_err();
        assert!(matches!(err, QueueError::ConnectionLost { .. }));
    }

    #[tokio::test]
    async fn records_acks_in_call_order() {
        let (queue, publisher) = InMemoryQueue::new("log_queue");
        let acks = queue.ack_log();
        let mut subscription = queue.subscribe().await.unwrap();
        publisher.publish("a");
        publisher.publish("b");
        let a = subscription.next_message().await.unwrap().unwrap();
        let b = subscription.next_message().await.unwrap().unwrap();
        b.acker.unwrap().ack().await.unwrap();
        a.acker.unwrap().ack().await.unwrap();
        assert_eq!(acks.tags(), vec![2, 1]);
    }

    #[tokio::test]
    async fn second_subscriber_is_refused() {
        let (queue, _publisher) = InMemoryQueue::new("log_queue");
        let _first = queue.subscribe().await.unwrap();
        assert!(matches!(
            queue.subscribe().await,
            Err(QueueError::Connect { .. })
        ));
    }
}

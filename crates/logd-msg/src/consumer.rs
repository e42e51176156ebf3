//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Long-running loop draining a queue subscription into the log store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use logd_common::IngestChannel;
use logd_persistence::{IngestError, Ingestor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::transport::{QueueMessage, SubscriptionSource};
use crate::{QueueError, Result};

/// Lifecycle of a [`ConsumerLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    /// Opening the broker connection and subscription.
    Connecting,
    /// Subscription established, no message seen yet.
    Subscribed,
    /// Waiting for the next delivery.
    Receiving,
    /// Handling a delivery.
    Persisting,
    /// The broker ended the subscription cleanly.
    Closed,
    /// The connection failed; carries the reason.
    Faulted(String),
}

impl ConsumerState {
    /// Whether the loop has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsumerState::Closed | ConsumerState::Faulted(_))
    }

    fn name(&self) -> &'static str {
        match self {
            ConsumerState::Connecting => "connecting",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Receiving => "receiving",
            ConsumerState::Persisting => "persisting",
            ConsumerState::Closed => "closed",
            ConsumerState::Faulted(_) => "faulted",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters describing what the loop has processed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Deliveries taken off the queue.
    pub received: u64,
    /// Deliveries that became stored records.
    pub persisted: u64,
    /// Deliveries dropped because the body was not a valid log entry.
    pub invalid: u64,
    /// Deliveries whose store write failed.
    pub store_failures: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    persisted: AtomicU64,
    invalid: AtomicU64,
    store_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Drains one queue into the store, one message at a time.
///
/// Consumption is at-most-once: a delivery is acknowledged as soon as it is
/// received, before decoding, so a failed write loses that entry.
pub struct ConsumerLoop {
    source: Arc<dyn SubscriptionSource>,
    ingestor: Ingestor,
    counters: Arc<Counters>,
    state: watch::Sender<ConsumerState>,
}

/// Handle to a spawned [`ConsumerLoop`].
pub struct ConsumerHandle {
    state: watch::Receiver<ConsumerState>,
    counters: Arc<Counters>,
    task: JoinHandle<Result<()>>,
}

impl ConsumerLoop {
    /// Build a loop reading from `source` and writing through `ingestor`.
    pub fn new(source: Arc<dyn SubscriptionSource>, ingestor: Ingestor) -> Self {
        let (state, _) = watch::channel(ConsumerState::Connecting);
        Self {
            source,
            ingestor,
            counters: Arc::new(Counters::default()),
            state,
        }
    }

    /// Run the loop on a new tokio task.
    pub fn spawn(self) -> ConsumerHandle {
        let state = self.state.subscribe();
        let counters = Arc::clone(&self.counters);
        let task = tokio::spawn(self.run());
        ConsumerHandle {
            state,
            counters,
            task,
        }
    }

    /// Run until the subscription ends.
    ///
    /// A clean end returns `Ok(())`. Failing to subscribe, or losing the
    /// connection afterwards, returns the error; the caller is expected to
    /// treat it as fatal.
    pub async fn run(self) -> Result<()> {
        let queue = self.source.queue_name().to_owned();
        let transport = self.source.transport();

        self.transition(ConsumerState::Connecting);
        let mut subscription = match self.source.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(%queue, transport, error = %err, "queue subscription failed");
                self.transition(ConsumerState::Faulted(err.to_string()));
                return Err(err);
            }
        };
        self.transition(ConsumerState::Subscribed);
        info!(%queue, transport, "consuming log queue");

        loop {
            self.transition(ConsumerState::Receiving);
            match subscription.next_message().await {
                None => {
                    info!(%queue, "queue subscription closed by broker");
                    self.transition(ConsumerState::Closed);
                    return Ok(());
                }
                Some(Err(err)) => {
                    error!(%queue, error = %err, "queue connection lost");
                    self.transition(ConsumerState::Faulted(err.to_string()));
                    return Err(match err {
                        QueueError::ConnectionLost { .. } => err,
                        other => QueueError::ConnectionLost {
                            queue,
                            reason: other.to_string(),
                        },
                    });
                }
                Some(Ok(message)) => {
                    self.transition(ConsumerState::Persisting);
                    self.handle(&queue, message).await;
                }
            }
        }
    }

    async fn handle(&self, queue: &str, message: QueueMessage) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.ingestor.metrics().record_queue_message(queue);
        let tag = message.delivery_tag;

        if let Some(acker) = &message.acker {
            if let Err(err) = acker.ack().await {
                warn!(%queue, delivery_tag = tag, error = %err, "failed to acknowledge delivery");
            }
        }

        match self
            .ingestor
            .ingest_bytes(IngestChannel::Queue, &message.body)
            .await
        {
            Ok(record) => {
                self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                debug!(%queue, delivery_tag = tag, id = %record.id, "queued log entry stored");
            }
            Err(err @ (IngestError::Decode(_) | IngestError::Validation(_))) => {
                self.counters.invalid.fetch_add(1, Ordering::Relaxed);
                warn!(%queue, delivery_tag = tag, error = %err, "dropping invalid queue message");
            }
            Err(err @ IngestError::Store(_)) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                error!(%queue, delivery_tag = tag, error = %err, "failed to store queued log entry");
            }
        }
    }

    fn transition(&self, next: ConsumerState) {
        let previous = self.state.send_replace(next.clone());
        if previous != next {
            debug!(from = %previous, to = %next, "consumer state changed");
        }
    }
}

impl ConsumerHandle {
    /// Current state of the loop.
    pub fn state(&self) -> ConsumerState {
        self.state.borrow().clone()
    }

    /// Watch channel following every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    /// Wait for the loop to stop and return its result.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(QueueError::ConnectionLost {
                queue: String::from("<consumer task>"),
                reason: err.to_string(),
            }),
        }
    }

    /// Stop the loop without waiting for it.
    pub fn abort(&self) {
        self.task.abort();
    }
}

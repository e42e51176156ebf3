//! ---
//! logd_section: "02-messaging-ipc-data-model"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "RabbitMQ subscription over AMQP 0-9-1."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use logd_common::AmqpConfig;
use tracing::{info, warn};

use crate::transport::{QueueMessage, Subscription, SubscriptionSource};
use crate::{QueueError, Result};

/// Connects to RabbitMQ and consumes one durable queue.
///
/// The consumer is registered with `no_ack`, so the broker treats every
/// delivery as acknowledged the moment it is sent.
pub struct AmqpSource {
    config: AmqpConfig,
    queue: String,
    consumer_tag: String,
}

impl AmqpSource {
    /// Source for `queue` on the broker described by `config`.
    pub fn new(config: AmqpConfig, queue: String, app_name: &str) -> Self {
        Self {
            config,
            queue,
            consumer_tag: format!("{app_name}-consumer"),
        }
    }

    fn uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.config.username.clone(),
                    password: self.config.password.expose().to_owned(),
                },
                host: self.config.host.clone(),
                port: self.config.port,
            },
            vhost: self.config.vhost.clone(),
            query: AMQPQueryString::default(),
        }
    }

    fn connect_error(&self, err: lapin::Error) -> QueueError {
        QueueError::Connect {
            queue: self.queue.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl SubscriptionSource for AmqpSource {
    async fn subscribe(&self) -> Result<Box<dyn Subscription>> {
        let properties =
            ConnectionProperties::default().with_connection_name(self.consumer_tag.clone().into());
        let connection = Connection::connect_uri(self.uri(), properties)
            .await
            .map_err(|err| self.connect_error(err))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|err| self.connect_error(err))?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| self.connect_error(err))?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| self.connect_error(err))?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            vhost = %self.config.vhost,
            queue = %self.queue,
            "subscribed to amqp queue"
        );

        Ok(Box::new(AmqpSubscription {
            queue: self.queue.clone(),
            consumer,
            _channel: channel,
            _connection: connection,
        }))
    }

    fn queue_name(&self) -> &str {
        &self.queue
    }

    fn transport(&self) -> &'static str {
        "amqp"
    }
}

struct AmqpSubscription {
    queue: String,
    consumer: Consumer,
    _channel: Channel,
    _connection: Connection,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next_message(&mut self) -> Option<Result<QueueMessage>> {
        match self.consumer.next().await? {
            Ok(delivery) => Some(Ok(QueueMessage::auto_acked(
                delivery.delivery_tag,
                delivery.data,
            ))),
            Err(err) => {
                warn!(queue = %self.queue, error = %err, "amqp consumer failed");
                Some(Err(QueueError::ConnectionLost {
                    queue: self.queue.clone(),
                    reason: err.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logd_common::Secret;

    #[test]
    fn uri_carries_configured_credentials() {
        let config = AmqpConfig {
            host: "rabbit".into(),
            port: 5673,
            username: "logger".into(),
            password: Secret::new("s3cret"),
            vhost: "/".into(),
        };
        let source = AmqpSource::new(config, "log_queue".into(), "logger-service");
        let uri = source.uri();
        assert_eq!(uri.authority.host, "rabbit");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "logger");
        assert_eq!(uri.authority.userinfo.password, "s3cret");
        assert_eq!(source.queue_name(), "log_queue");
        assert_eq!(source.consumer_tag, "logger-service-consumer");
    }
}

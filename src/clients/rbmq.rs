use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::{
    error::PublishError,
    listener::EventSink,
    models::{event::WebhookEvent, message::Envelope},
};

pub const QUEUE_NAME: &str = "webhook_queue";
pub const DEAD_LETTER_EXCHANGE: &str = "webhook_dlx";
pub const DEAD_LETTER_QUEUE: &str = "webhook_queue_dlq";
pub const DEAD_LETTER_ROUTING_KEY: &str = "webhook_failed";

pub async fn connect(rabbitmq_url: &str) -> Result<Connection, Error> {
    info!("Connecting to RabbitMQ");

    let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default())
        .await
        .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

    info!("RabbitMQ connection established");

    Ok(connection)
}

/// Names and arguments of the main queue and its dead-letter path.
///
/// Declared once at startup. Everything else refers to the names only, so a
/// rejection without requeue on `queue` lands in `dead_letter_queue` through
/// the broker's dead-letter policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub queue: String,
    pub dead_letter_exchange: String,
    pub dead_letter_queue: String,
    pub dead_letter_routing_key: String,
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self {
            queue: QUEUE_NAME.to_string(),
            dead_letter_exchange: DEAD_LETTER_EXCHANGE.to_string(),
            dead_letter_queue: DEAD_LETTER_QUEUE.to_string(),
            dead_letter_routing_key: DEAD_LETTER_ROUTING_KEY.to_string(),
        }
    }
}

impl QueueTopology {
    pub fn queue_arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.dead_letter_exchange.as_str().into()),
        );
        arguments.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(self.dead_letter_routing_key.as_str().into()),
        );
        arguments
    }

    /// Redeclaring with identical parameters is a no-op on the broker. A
    /// mismatch closes the channel with PRECONDITION_FAILED and surfaces here.
    pub async fn declare(&self, channel: &Channel) -> Result<(), Error> {
        channel
            .exchange_declare(
                self.dead_letter_exchange.as_str(),
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare dead-letter exchange: {}", e))?;

        debug!(exchange = %self.dead_letter_exchange, "Dead-letter exchange declared");

        channel
            .queue_declare(
                self.dead_letter_queue.as_str(),
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare dead-letter queue: {}", e))?;

        channel
            .queue_bind(
                self.dead_letter_queue.as_str(),
                self.dead_letter_exchange.as_str(),
                self.dead_letter_routing_key.as_str(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind dead-letter queue: {}", e))?;

        debug!(queue = %self.dead_letter_queue, "Dead-letter queue declared and bound");

        channel
            .queue_declare(
                self.queue.as_str(),
                QueueDeclareOptions::default(),
                self.queue_arguments(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", self.queue, e))?;

        info!(
            queue = %self.queue,
            dead_letter_queue = %self.dead_letter_queue,
            "Queue topology declared"
        );

        Ok(())
    }

    /// Declares on a short-lived channel of its own.
    pub async fn declare_on(&self, connection: &Connection) -> Result<(), Error> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        self.declare(&channel).await?;

        channel
            .close(200, "topology declared".into())
            .await
            .map_err(|e| anyhow!("Failed to close setup channel: {}", e))?;

        Ok(())
    }
}

/// Wraps events in envelopes and publishes them onto the main queue.
///
/// A publish that does not complete within the timeout is abandoned; the
/// caller logs it and moves on.
pub struct EventPublisher {
    channel: Channel,
    queue_name: String,
    publish_timeout: Duration,
}

impl EventPublisher {
    pub async fn new(
        connection: &Connection,
        topology: &QueueTopology,
        publish_timeout: Duration,
    ) -> Result<Self, Error> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        info!(queue = %topology.queue, "Publisher channel created");

        Ok(Self {
            channel,
            queue_name: topology.queue.clone(),
            publish_timeout,
        })
    }

    pub async fn publish(&self, event: &WebhookEvent) -> Result<(), PublishError> {
        let envelope = Envelope::new(event.clone());
        let payload = serde_json::to_vec(&envelope)?;

        let publish = async {
            self.channel
                .basic_publish(
                    "",
                    self.queue_name.as_str(),
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default().with_content_type("application/json".into()),
                )
                .await
                .map_err(|e| PublishError::Broker(e.to_string()))?
                .await
                .map_err(|e| PublishError::Broker(e.to_string()))?;

            Ok::<(), PublishError>(())
        };

        timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| PublishError::Timeout {
                timeout_secs: self.publish_timeout.as_secs(),
            })??;

        info!(
            event_name = %event.event_name,
            webhook_id = %event.webhook_id,
            "Published event"
        );

        Ok(())
    }
}

#[async_trait]
impl EventSink for EventPublisher {
    async fn publish(&self, event: &WebhookEvent) -> Result<(), PublishError> {
        EventPublisher::publish(self, event).await
    }
}

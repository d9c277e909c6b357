//! Queue consumer

use crate::{
    client::NatsClient,
    delivery::{Delivery, DeliveryStream},
    message::Message,
    metrics::MESSAGE_RECEIVE_TOTAL,
    types::RoutingKey,
    Error, Result,
};
use async_nats::jetstream::{consumer, AckKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Durable consumer name
    pub durable_name: String,

    /// Acknowledgment wait time
    pub ack_wait: Duration,

    /// Max delivery attempts
    pub max_deliver: i64,

    /// Use JetStream (vs core NATS)
    pub use_jetstream: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            durable_name: "message-bus-consumer".to_string(),
            ack_wait: Duration::from_secs(30),
            max_deliver: 3,
            use_jetstream: true,
        }
    }
}

/// Message subscriber
pub struct Subscriber {
    client: Arc<NatsClient>,
    config: SubscriberConfig,
}

impl Subscriber {
    /// Create new subscriber
    pub fn new(client: Arc<NatsClient>, config: SubscriberConfig) -> Self {
        Self { client, config }
    }

    /// Start consuming a queue
    pub async fn consume(&self, queue: &RoutingKey) -> Result<DeliveryStream> {
        if self.config.use_jetstream {
            self.consume_jetstream(queue).await
        } else {
            self.consume_core(queue).await
        }
    }

    /// Consume using JetStream (durable, acknowledged)
    async fn consume_jetstream(&self, queue: &RoutingKey) -> Result<DeliveryStream> {
        let stream_name = queue.stream_name();

        info!(
            "Consuming {} from JetStream stream {} (consumer: {})",
            queue, stream_name, self.config.durable_name
        );

        let stream = self
            .client
            .get_or_create_stream(&stream_name, queue.stream_subjects())
            .await?;

        let consumer_config = consumer::pull::Config {
            durable_name: Some(self.config.durable_name.clone()),
            filter_subject: queue.to_string(),
            ack_policy: consumer::AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            max_deliver: self.config.max_deliver,
            deliver_policy: consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&self.config.durable_name, consumer_config)
            .await
            .map_err(|e| Error::JetStream(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!("✅ JetStream consumer ready for {}", queue);

        let label = stream_name;
        let deliveries = messages.filter_map(move |msg| {
            let label = label.clone();
            async move {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) => return Some(Err(Error::Subscribe(e.to_string()))),
                };

                match Message::from_bytes(&msg.payload) {
                    Ok(message) => {
                        MESSAGE_RECEIVE_TOTAL
                            .with_label_values(&[label.as_str(), "success"])
                            .inc();
                        Some(Ok(Delivery::jetstream(message, msg)))
                    }
                    Err(e) => {
                        error!("Failed to parse message: {}", e);
                        MESSAGE_RECEIVE_TOTAL
                            .with_label_values(&[label.as_str(), "parse_error"])
                            .inc();

                        // Terminate bad message (won't be redelivered)
                        if let Err(term_err) = msg.ack_with(AckKind::Term).await {
                            error!("Failed to terminate bad message: {}", term_err);
                        }
                        None
                    }
                }
            }
        });

        Ok(deliveries.boxed())
    }

    /// Consume using core NATS (no persistence)
    async fn consume_core(&self, queue: &RoutingKey) -> Result<DeliveryStream> {
        let client = self.client.client().await?;

        info!("Subscribing to core NATS subject: {}", queue);

        let subscriber = client
            .queue_subscribe(queue.to_string(), self.config.durable_name.clone())
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!("✅ Subscribed to {}", queue);

        let label = queue.stream_name();
        let deliveries = subscriber.filter_map(move |msg| {
            let parsed = match Message::from_bytes(&msg.payload) {
                Ok(message) => {
                    MESSAGE_RECEIVE_TOTAL
                        .with_label_values(&[label.as_str(), "success"])
                        .inc();
                    Some(Ok(Delivery::core(message)))
                }
                Err(e) => {
                    error!("Failed to parse message: {}", e);
                    MESSAGE_RECEIVE_TOTAL
                        .with_label_values(&[label.as_str(), "parse_error"])
                        .inc();
                    None
                }
            };
            futures::future::ready(parsed)
        });

        Ok(deliveries.boxed())
    }
}

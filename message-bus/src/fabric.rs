//! Publish/consume seam used by transports

use crate::{
    client::NatsClient,
    delivery::DeliveryStream,
    message::Message,
    publisher::{Publisher, PublisherConfig},
    subscriber::{Subscriber, SubscriberConfig},
    types::RoutingKey,
    Result,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Message fabric: publish on a routing key, consume a named queue
#[async_trait]
pub trait MessageFabric: Send + Sync {
    /// Publish message on its routing key
    async fn publish(&self, message: &Message) -> Result<()>;

    /// Start consuming a queue; deliveries must be settled by the caller
    async fn consume(&self, queue: &RoutingKey) -> Result<DeliveryStream>;
}

/// Fabric backed by NATS
pub struct NatsFabric {
    publisher: Publisher,
    subscriber: Subscriber,
}

impl NatsFabric {
    /// Create fabric sharing one client between publisher and subscriber
    pub fn new(
        client: Arc<NatsClient>,
        publisher: PublisherConfig,
        subscriber: SubscriberConfig,
    ) -> Self {
        Self {
            publisher: Publisher::new(client.clone(), publisher),
            subscriber: Subscriber::new(client, subscriber),
        }
    }
}

#[async_trait]
impl MessageFabric for NatsFabric {
    async fn publish(&self, message: &Message) -> Result<()> {
        self.publisher.publish(message).await
    }

    async fn consume(&self, queue: &RoutingKey) -> Result<DeliveryStream> {
        self.subscriber.consume(queue).await
    }
}

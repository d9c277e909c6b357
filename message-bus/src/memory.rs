//! In-process message fabric
//!
//! Keeps every published message, feeds queued messages to a single
//! consumer per queue and records how each delivery was settled.

use crate::{
    delivery::{AckRecord, Delivery, DeliveryStream},
    fabric::MessageFabric,
    message::Message,
    types::RoutingKey,
    Error, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

#[derive(Default)]
struct Queues {
    consumers: HashMap<RoutingKey, mpsc::UnboundedSender<Delivery>>,
    backlog: HashMap<RoutingKey, Vec<Message>>,
}

/// In-memory fabric
#[derive(Default)]
pub struct MemoryFabric {
    published: Mutex<Vec<Message>>,
    queues: Mutex<Queues>,
    acks: Arc<Mutex<Vec<AckRecord>>>,
    notify: Notify,
    unavailable: Mutex<bool>,
}

impl MemoryFabric {
    /// Create empty fabric
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a message on a queue, delivered to its consumer or held until one attaches
    pub fn enqueue(&self, queue: &RoutingKey, payload: serde_json::Value) -> Message {
        let message = Message::new(queue.clone(), payload);
        let mut queues = self.queues.lock();

        let undelivered = match queues.consumers.get(queue) {
            Some(tx) => tx
                .send(Delivery::memory(message.clone(), self.acks.clone()))
                .err()
                .map(|e| e.0.message),
            None => Some(message.clone()),
        };

        if let Some(message) = undelivered {
            queues.consumers.remove(queue);
            queues.backlog.entry(queue.clone()).or_default().push(message);
        }

        message
    }

    /// Make publish and consume fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    /// Every published message, in publish order
    pub fn published(&self) -> Vec<Message> {
        self.published.lock().clone()
    }

    /// Messages published on an exact routing key
    pub fn published_on(&self, key: &RoutingKey) -> Vec<Message> {
        self.published
            .lock()
            .iter()
            .filter(|m| &m.routing_key == key)
            .cloned()
            .collect()
    }

    /// Settlement log of consumed deliveries
    pub fn acks(&self) -> Vec<AckRecord> {
        self.acks.lock().clone()
    }

    /// Wait until at least `count` messages have been published
    pub async fn wait_for_published(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.published.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.lock() {
            return Err(Error::Connection("memory fabric marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageFabric for MemoryFabric {
    async fn publish(&self, message: &Message) -> Result<()> {
        self.check_available()?;
        debug!("Publishing message {} to subject: {}", message.id, message.subject());
        self.published.lock().push(message.clone());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &RoutingKey) -> Result<DeliveryStream> {
        self.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut queues = self.queues.lock();

        for message in queues.backlog.remove(queue).unwrap_or_default() {
            // Receiver is held locally, send cannot fail
            let _ = tx.send(Delivery::memory(message, self.acks.clone()));
        }
        queues.consumers.insert(queue.clone(), tx);

        Ok(UnboundedReceiverStream::new(rx).map(Ok::<_, Error>).boxed())
    }
}

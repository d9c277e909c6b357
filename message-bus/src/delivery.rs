//! Consumed messages and their acknowledgement handles

use crate::{message::Message, Error, Result};
use async_nats::jetstream::{self, AckKind};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Stream of consumed messages
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Processed; do not redeliver
    Ack,
    /// Processing failed; redeliver
    Nak,
    /// Unprocessable; never redeliver
    Reject,
}

/// Settlement record kept by the in-memory fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    /// Settled message
    pub message_id: Uuid,
    /// Outcome
    pub outcome: AckOutcome,
}

enum Acker {
    /// Core NATS, nothing to settle
    None,
    JetStream(jetstream::Message),
    Memory(Arc<Mutex<Vec<AckRecord>>>),
}

/// A consumed message that must be settled exactly once
pub struct Delivery {
    /// Envelope
    pub message: Message,
    acker: Acker,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    /// Delivery from core NATS
    pub(crate) fn core(message: Message) -> Self {
        Self {
            message,
            acker: Acker::None,
        }
    }

    /// Delivery from a JetStream pull consumer
    pub(crate) fn jetstream(message: Message, raw: jetstream::Message) -> Self {
        Self {
            message,
            acker: Acker::JetStream(raw),
        }
    }

    /// Delivery from the in-memory fabric
    pub(crate) fn memory(message: Message, log: Arc<Mutex<Vec<AckRecord>>>) -> Self {
        Self {
            message,
            acker: Acker::Memory(log),
        }
    }

    /// Acknowledge successful processing
    pub async fn ack(self) -> Result<()> {
        self.settle(AckOutcome::Ack).await
    }

    /// Negative acknowledgement, the fabric redelivers
    pub async fn nak(self) -> Result<()> {
        self.settle(AckOutcome::Nak).await
    }

    /// Terminate an unprocessable message
    pub async fn reject(self) -> Result<()> {
        self.settle(AckOutcome::Reject).await
    }

    async fn settle(self, outcome: AckOutcome) -> Result<()> {
        match self.acker {
            Acker::None => Ok(()),
            Acker::JetStream(raw) => {
                let kind = match outcome {
                    AckOutcome::Ack => AckKind::Ack,
                    AckOutcome::Nak => AckKind::Nak(None),
                    AckOutcome::Reject => AckKind::Term,
                };
                raw.ack_with(kind)
                    .await
                    .map_err(|e| Error::Ack(format!("{}: {}", self.message.id, e)))
            }
            Acker::Memory(log) => {
                log.lock().push(AckRecord {
                    message_id: self.message.id,
                    outcome,
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoutingKey;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_delivery_records_outcome() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let message = Message::new(RoutingKey::from_segments(["q"]), json!({}));
        let id = message.id;

        Delivery::memory(message, log.clone()).nak().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![AckRecord {
                message_id: id,
                outcome: AckOutcome::Nak
            }]
        );
    }

    #[tokio::test]
    async fn test_core_delivery_ack_is_noop() {
        let message = Message::new(RoutingKey::from_segments(["q"]), json!({}));
        assert!(Delivery::core(message).ack().await.is_ok());
    }
}

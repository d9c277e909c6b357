//! Message Bus with NATS support
//!
//! Provides the publish/consume primitives the transports run on:
//! - Dotted routing keys mapped onto NATS subjects
//! - JetStream for persistence and redelivery of negatively acknowledged messages
//! - A [`MessageFabric`] seam with NATS and in-memory implementations
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod delivery;
pub mod error;
pub mod fabric;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use client::{NatsClient, NatsConfig};
pub use delivery::{AckOutcome, AckRecord, Delivery, DeliveryStream};
pub use error::{Error, Result};
pub use fabric::{MessageFabric, NatsFabric};
pub use memory::MemoryFabric;
pub use message::Message;
pub use publisher::{Publisher, PublisherConfig};
pub use subscriber::{Subscriber, SubscriberConfig};
pub use types::RoutingKey;

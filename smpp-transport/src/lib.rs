//! SMPP Transport
//!
//! Bridges one SMPP (ESME) session to the message bus.
//!
//! # Architecture
//!
//! - **Lifecycle**: [`SmppTransport`] owns the session context and runs a
//!   single cooperative loop over session events and the outbound queue
//! - **Correlation**: [`SequenceStore`] persists the last sequence number and
//!   the sequence → message id mapping in a namespaced key-value store
//! - **Routing**: [`RoutingTable`] picks the sender address per destination
//!
//! # Invariants
//!
//! - Outbound messages are submitted strictly one at a time, in queue order
//! - At most one pending entry per sequence number
//! - Keys of distinct transport identities never collide

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod identity;
pub mod inbound;
pub mod metrics;
pub mod routing;
pub mod sequence;
pub mod session;
pub mod store;
pub mod transport;

// Re-exports
pub use config::TransportConfig;
pub use error::{ErrorKind, Result, TransportError};
pub use identity::TransportIdentity;
pub use routing::RoutingTable;
pub use sequence::SequenceStore;
pub use transport::{Lifecycle, SmppTransport};

/// Service name
pub const SERVICE_NAME: &str = "smpp-transport";

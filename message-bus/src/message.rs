//! Message envelope for pub/sub

use crate::types::RoutingKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Routing key the message is published on
    pub routing_key: RoutingKey,

    /// Payload (JSON)
    pub payload: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Correlation ID (for tracing)
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Headers (metadata)
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Create new message
    pub fn new(routing_key: RoutingKey, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            routing_key,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            headers: HashMap::new(),
        }
    }

    /// Create message from any serializable payload
    pub fn with_payload<T: Serialize>(routing_key: RoutingKey, payload: &T) -> crate::Result<Self> {
        Ok(Self::new(routing_key, serde_json::to_value(payload)?))
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Get NATS subject for this message
    pub fn subject(&self) -> &str {
        self.routing_key.as_str()
    }
}

//! Events published by the transport and the outbound message shape

use crate::error::{Result, TransportError};
use chrono::NaiveDateTime;
use message_bus::{Message, MessageFabric, RoutingKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Delivery report `done date` format
pub const DONE_DATE_FORMAT: &str = "%y%m%d%H%M%S";

/// Routing keys of one transport
pub mod routing_keys {
    use message_bus::RoutingKey;

    /// `sms.ack.<transport>`
    pub fn ack(transport_name: &str) -> RoutingKey {
        RoutingKey::from_segments(["sms", "ack", transport_name])
    }

    /// `sms.receipt.<transport>`
    pub fn receipt(transport_name: &str) -> RoutingKey {
        RoutingKey::from_segments(["sms", "receipt", transport_name])
    }

    /// `sms.inbound.<transport>.<destination>`
    pub fn inbound(transport_name: &str, destination: &str) -> RoutingKey {
        RoutingKey::from_segments(["sms", "inbound", transport_name, destination])
    }

    /// `sms.outbound.<transport>.failures`
    pub fn failures(transport_name: &str) -> RoutingKey {
        outbound(transport_name).child("failures")
    }

    /// `sms.outbound.<transport>`, the queue this transport consumes
    pub fn outbound(transport_name: &str) -> RoutingKey {
        RoutingKey::from_segments(["sms", "outbound", transport_name])
    }
}

/// Queued outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message id assigned upstream
    pub id: String,
    /// Recipient
    pub to_msisdn: String,
    /// Content
    pub message: String,
    /// Sender requested upstream, used when routing has no match
    #[serde(default)]
    pub from_msisdn: Option<String>,
}

/// Submission acknowledged by the SMSC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckEvent {
    /// Originating message id; `None` when the correlation was lost
    pub id: Option<String>,
    /// SMSC message id
    pub transport_message_id: String,
}

/// Delivery receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEvent {
    /// Transport that received the report
    pub transport_name: String,
    /// SMSC message id
    pub transport_msg_id: String,
    /// Final state, e.g. `DELIVRD`
    pub transport_status: String,
    /// When the final state was reached
    pub transport_delivered_at: NaiveDateTime,
}

/// Message that could not be sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Failed message, or `{id}` when only the id is known
    pub message: serde_json::Value,
    /// Failure reason
    pub reason: String,
}

/// Parse a `done date` value; exactly twelve digits, `yyMMddHHmmss`
pub fn parse_done_date(value: &str) -> Result<NaiveDateTime> {
    let malformed = |reason: String| TransportError::MalformedTimestamp {
        value: value.to_string(),
        reason,
    };

    if value.len() != 12 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("expected 12 digits yyMMddHHmmss".to_string()));
    }
    NaiveDateTime::parse_from_str(value, DONE_DATE_FORMAT).map_err(|e| malformed(e.to_string()))
}

/// Publisher scoped to one transport's routing namespace
#[derive(Clone)]
pub struct TransportPublisher {
    fabric: Arc<dyn MessageFabric>,
    transport_name: String,
}

impl TransportPublisher {
    /// Open publisher for `transport_name`
    pub fn new(fabric: Arc<dyn MessageFabric>, transport_name: impl Into<String>) -> Self {
        let transport_name = transport_name.into();
        info!("📤 Publisher opened for transport {}", transport_name);
        Self {
            fabric,
            transport_name,
        }
    }

    /// Transport name
    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    /// Publish on `sms.ack.<transport>`
    pub async fn publish_ack(&self, event: &AckEvent) -> Result<Message> {
        self.publish(routing_keys::ack(&self.transport_name), event).await
    }

    /// Publish on `sms.receipt.<transport>`
    pub async fn publish_receipt(&self, event: &ReceiptEvent) -> Result<Message> {
        self.publish(routing_keys::receipt(&self.transport_name), event)
            .await
    }

    /// Publish raw inbound fields on `sms.inbound.<transport>.<destination>`
    pub async fn publish_inbound(
        &self,
        destination: &str,
        payload: serde_json::Value,
    ) -> Result<Message> {
        let key = routing_keys::inbound(&self.transport_name, destination);
        self.send(Message::new(key, payload)).await
    }

    /// Publish on `sms.outbound.<transport>.failures`
    pub async fn publish_failure(&self, event: &FailureEvent) -> Result<Message> {
        self.publish(routing_keys::failures(&self.transport_name), event)
            .await
    }

    async fn publish<T: Serialize>(&self, key: RoutingKey, payload: &T) -> Result<Message> {
        let message = Message::with_payload(key, payload)?;
        self.send(message).await
    }

    async fn send(&self, message: Message) -> Result<Message> {
        self.fabric.publish(&message).await?;
        debug!("Published {} on {}", message.id, message.routing_key);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use message_bus::MemoryFabric;
    use serde_json::json;

    #[test]
    fn test_routing_keys() {
        assert_eq!(routing_keys::ack("smpp").as_str(), "sms.ack.smpp");
        assert_eq!(routing_keys::receipt("smpp").as_str(), "sms.receipt.smpp");
        assert_eq!(
            routing_keys::inbound("smpp", "1458").as_str(),
            "sms.inbound.smpp.1458"
        );
        assert_eq!(
            routing_keys::failures("smpp").as_str(),
            "sms.outbound.smpp.failures"
        );
        assert_eq!(routing_keys::outbound("smpp").as_str(), "sms.outbound.smpp");
    }

    #[test]
    fn test_parse_done_date() {
        let parsed = parse_done_date("130902070735").unwrap();
        let expected = NaiveDate::from_ymd_opt(2013, 9, 2)
            .unwrap()
            .and_hms_opt(7, 7, 35)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_done_date_is_strict() {
        for value in [
            "1309020707",
            "13090207073",
            "1309020707355",
            "2013-09-02",
            "13090207073x",
            "131302070735",
            "",
        ] {
            let err = parse_done_date(value).unwrap_err();
            assert!(
                matches!(err, TransportError::MalformedTimestamp { .. }),
                "{} accepted",
                value
            );
        }
    }

    #[test]
    fn test_outbound_from_msisdn_optional() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "id": "m1",
            "to_msisdn": "+27831234567",
            "message": "hello",
        }))
        .unwrap();
        assert_eq!(message.from_msisdn, None);
    }

    #[test]
    fn test_receipt_serializes_iso_timestamp() {
        let event = ReceiptEvent {
            transport_name: "smpp".to_string(),
            transport_msg_id: "abc123".to_string(),
            transport_status: "DELIVRD".to_string(),
            transport_delivered_at: parse_done_date("130902070735").unwrap(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["transport_delivered_at"], "2013-09-02T07:07:35");
    }

    #[tokio::test]
    async fn test_publish_ack_with_null_id() {
        let fabric = Arc::new(MemoryFabric::new());
        let publisher = TransportPublisher::new(fabric.clone(), "smpp");

        publisher
            .publish_ack(&AckEvent {
                id: None,
                transport_message_id: "abc123".to_string(),
            })
            .await
            .unwrap();

        let published = fabric.published_on(&routing_keys::ack("smpp"));
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].payload,
            json!({"id": null, "transport_message_id": "abc123"})
        );
    }

    #[tokio::test]
    async fn test_publish_fails_when_fabric_down() {
        let fabric = Arc::new(MemoryFabric::new());
        fabric.set_unavailable(true);
        let publisher = TransportPublisher::new(fabric.clone(), "smpp");

        let err = publisher
            .publish_inbound("1458", json!({"short_message": "hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Publish(_)));
    }
}

//! SMPP session interface
//!
//! PDU framing, binding and keep-alive belong to the session library. The
//! transport sees a session through three seams:
//! - [`SessionConnector`] establishes a bind seeded with a sequence number
//! - [`EsmeSession`] submits short messages
//! - [`EsmeHandler`] receives every session event, one method per kind

mod simulator;

pub use simulator::{LoopbackSmsc, SimulatorConfig};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SMPP sequence number
pub type SequenceNumber = u32;

/// Largest sequence number allowed by SMPP 3.4; the session wraps to 1 after it
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = 0x7FFF_FFFF;

/// Sequence number following `last`
pub fn next_sequence_number(last: SequenceNumber) -> SequenceNumber {
    if last >= MAX_SEQUENCE_NUMBER {
        1
    } else {
        last + 1
    }
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Could not bind
    #[error("Bind failed: {0}")]
    Bind(String),

    /// SMSC or session refused the PDU
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Session is not bound
    #[error("Session closed")]
    Closed,
}

/// Bind parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindParams {
    /// ESME system id
    pub system_id: String,
    /// Password
    pub password: String,
    /// System type
    pub system_type: String,
    /// SMSC host
    pub host: String,
    /// SMSC port
    pub port: u16,
}

/// submit_sm request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSm {
    /// Sender address
    pub source_addr: String,
    /// Recipient MSISDN
    pub destination_addr: String,
    /// UTF-8 encoded content
    pub short_message: Bytes,
}

/// SMPP command_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandStatus(pub u32);

impl CommandStatus {
    /// ESME_ROK
    pub const OK: CommandStatus = CommandStatus(0x0000_0000);
    /// ESME_RSYSERR
    pub const SYSTEM_ERROR: CommandStatus = CommandStatus(0x0000_0008);
    /// ESME_RMSGQFUL
    pub const MESSAGE_QUEUE_FULL: CommandStatus = CommandStatus(0x0000_0014);
    /// ESME_RTHROTTLED
    pub const THROTTLED: CommandStatus = CommandStatus(0x0000_0058);

    /// Symbolic SMPP name, when known
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            0x0000_0000 => "ESME_ROK",
            0x0000_0001 => "ESME_RINVMSGLEN",
            0x0000_0002 => "ESME_RINVCMDLEN",
            0x0000_0003 => "ESME_RINVCMDID",
            0x0000_0004 => "ESME_RINVBNDSTS",
            0x0000_0005 => "ESME_RALYBND",
            0x0000_0008 => "ESME_RSYSERR",
            0x0000_000A => "ESME_RINVSRCADR",
            0x0000_000B => "ESME_RINVDSTADR",
            0x0000_000C => "ESME_RINVMSGID",
            0x0000_000D => "ESME_RBINDFAIL",
            0x0000_0014 => "ESME_RMSGQFUL",
            0x0000_0045 => "ESME_RSUBMITFAIL",
            0x0000_0058 => "ESME_RTHROTTLED",
            0x0000_0064 => "ESME_RX_T_APPN",
            0x0000_0065 => "ESME_RX_P_APPN",
            0x0000_0066 => "ESME_RX_R_APPN",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

/// PDU header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduHeader {
    /// command_id
    pub command_id: u32,
    /// command_status
    pub command_status: CommandStatus,
    /// sequence_number
    pub sequence_number: SequenceNumber,
}

/// Decoded PDU as handed over by the session library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdu {
    /// Header
    pub header: PduHeader,
    /// Body fields
    #[serde(default)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Delivery receipt fields
///
/// `id:… sub:… dlvrd:… submit date:… done date:… stat:… err:…`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// SMSC message id of the original submission
    pub id: String,
    /// Messages submitted
    #[serde(default)]
    pub sub: Option<String>,
    /// Messages delivered
    #[serde(default)]
    pub dlvrd: Option<String>,
    /// Submit time, `yyMMddHHmm`
    #[serde(default)]
    pub submit_date: Option<String>,
    /// Final state time, `yyMMddHHmmss`
    pub done_date: String,
    /// Final state, e.g. `DELIVRD`
    pub stat: String,
    /// Network error code
    #[serde(default)]
    pub err: Option<String>,
    /// First characters of the message
    #[serde(default)]
    pub text: Option<String>,
}

/// Mobile-originated deliver_sm, kept as the raw field set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverSm {
    /// Sender MSISDN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_addr: Option<String>,
    /// Number the message was sent to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_addr: Option<String>,
    /// Decoded content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
    /// Every other field supplied by the session library
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Event raised by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Bound and ready to submit
    Connected,
    /// Connection lost
    Disconnected,
    /// submit_sm_resp
    SubmitSmResp {
        /// Sequence number of the submit_sm
        sequence_number: SequenceNumber,
        /// SMSC assigned message id
        message_id: String,
    },
    /// Delivery receipt
    DeliveryReport(DeliveryReport),
    /// Mobile-originated message
    DeliverSm(DeliverSm),
    /// The session gave up on a message
    SendFailure {
        /// Failed message payload
        message: serde_json::Value,
        /// Reason reported by the session
        reason: String,
    },
    /// Transient error response to a submitted PDU
    TempFault(Pdu),
}

impl SessionEvent {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connect",
            SessionEvent::Disconnected => "disconnect",
            SessionEvent::SubmitSmResp { .. } => "submit_sm_resp",
            SessionEvent::DeliveryReport(_) => "delivery_report",
            SessionEvent::DeliverSm(_) => "deliver_sm",
            SessionEvent::SendFailure { .. } => "send_failure",
            SessionEvent::TempFault(_) => "temp_fault",
        }
    }
}

/// Stream of session events, in arrival order
pub type SessionEvents = BoxStream<'static, SessionEvent>;

/// A bound session
#[async_trait]
pub trait EsmeSession: Send {
    /// Submit a short message; returns the sequence number it was sent under
    async fn submit_sm(
        &mut self,
        pdu: SubmitSm,
    ) -> std::result::Result<SequenceNumber, SessionError>;

    /// Unbind and release the connection
    async fn close(&mut self);
}

/// Established session and its event stream
pub struct SessionHandle {
    /// Session used for submissions
    pub session: Box<dyn EsmeSession>,
    /// Events raised by the session
    pub events: SessionEvents,
}

/// Establishes sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Bind; the session continues numbering after `last_sequence_number`
    async fn connect(
        &self,
        bind: &BindParams,
        last_sequence_number: SequenceNumber,
    ) -> std::result::Result<SessionHandle, SessionError>;
}

/// Receiver of session events
#[async_trait]
pub trait EsmeHandler: Send {
    /// Session bound
    async fn on_connect(&mut self) -> Result<()>;

    /// Session lost; reconnecting is the session library's job
    async fn on_disconnect(&mut self) -> Result<()>;

    /// submit_sm_resp for `sequence_number`
    async fn on_submit_sm_resp(
        &mut self,
        sequence_number: SequenceNumber,
        message_id: String,
    ) -> Result<()>;

    /// Delivery receipt
    async fn on_delivery_report(&mut self, report: DeliveryReport) -> Result<()>;

    /// Mobile-originated message
    async fn on_deliver_sm(&mut self, deliver: DeliverSm) -> Result<()>;

    /// Message the session could not send
    async fn on_send_failure(&mut self, message: serde_json::Value, reason: String) -> Result<()>;

    /// Transient fault for a submitted PDU
    async fn on_temp_fault(&mut self, pdu: Pdu) -> Result<()>;
}

/// Route one event to the matching handler method
pub async fn dispatch_event<H>(handler: &mut H, event: SessionEvent) -> Result<()>
where
    H: EsmeHandler + ?Sized,
{
    match event {
        SessionEvent::Connected => handler.on_connect().await,
        SessionEvent::Disconnected => handler.on_disconnect().await,
        SessionEvent::SubmitSmResp {
            sequence_number,
            message_id,
        } => handler.on_submit_sm_resp(sequence_number, message_id).await,
        SessionEvent::DeliveryReport(report) => handler.on_delivery_report(report).await,
        SessionEvent::DeliverSm(deliver) => handler.on_deliver_sm(deliver).await,
        SessionEvent::SendFailure { message, reason } => {
            handler.on_send_failure(message, reason).await
        }
        SessionEvent::TempFault(pdu) => handler.on_temp_fault(pdu).await,
    }
}

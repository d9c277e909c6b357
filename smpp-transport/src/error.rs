//! Error types for the transport

use crate::session::SessionError;
use crate::store::StoreError;
use crate::transport::Lifecycle;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// The session rejected or failed a submit_sm
    #[error("Protocol submission failed: {0}")]
    Submission(#[source] SessionError),

    /// The session could not be established
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A correlation or routing lookup found nothing
    #[error("Lookup miss: no {table} entry for {key}")]
    LookupMiss {
        /// Table that was consulted
        table: &'static str,
        /// Key that was looked up
        key: String,
    },

    /// Delivery report timestamp not in `yyMMddHHmmss` form
    #[error("Malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp {
        /// Raw value from the report
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Key-value store call failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Message fabric call failed
    #[error("Publish failed: {0}")]
    Publish(#[from] message_bus::Error),

    /// Outbound payload missing required fields
    #[error("Malformed outbound message: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid lifecycle state: expected {expected}, got {actual}")]
    InvalidLifecycle {
        /// Required state
        expected: Lifecycle,
        /// Current state
        actual: Lifecycle,
    },

    /// Event arrived before the session connected
    #[error("Publisher not open; session has not connected")]
    NotConnected,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named error kinds, one per failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// submit_sm failed; the dispatch cycle is aborted and the message redelivered
    ProtocolSubmissionFailure,
    /// Session could not be established
    SessionUnavailable,
    /// Missing correlation or routing data; never fatal
    LookupMiss,
    /// Unparseable delivery report timestamp
    MalformedTimestamp,
    /// Store call failed
    StoreUnavailable,
    /// Fabric call failed
    PublishFailure,
    /// Unusable outbound payload
    MalformedMessage,
    /// Handler invoked outside the running state
    Lifecycle,
    /// Invalid configuration
    Configuration,
}

impl ErrorKind {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProtocolSubmissionFailure => "protocol_submission_failure",
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::LookupMiss => "lookup_miss",
            ErrorKind::MalformedTimestamp => "malformed_timestamp",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::PublishFailure => "publish_failure",
            ErrorKind::MalformedMessage => "malformed_message",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl TransportError {
    /// Error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Submission(_) => ErrorKind::ProtocolSubmissionFailure,
            TransportError::Session(_) => ErrorKind::SessionUnavailable,
            TransportError::LookupMiss { .. } => ErrorKind::LookupMiss,
            TransportError::MalformedTimestamp { .. } => ErrorKind::MalformedTimestamp,
            TransportError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            TransportError::Publish(_) | TransportError::Serialization(_) => {
                ErrorKind::PublishFailure
            }
            TransportError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            TransportError::InvalidLifecycle { .. } | TransportError::NotConnected => {
                ErrorKind::Lifecycle
            }
            TransportError::Config(_) | TransportError::Io(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the error aborts the current handler invocation
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::LookupMiss
    }
}

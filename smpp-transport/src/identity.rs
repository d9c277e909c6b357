//! Transport identity and store namespace

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one SMPP bind: `system_id` at `host:port`.
///
/// Several transports may share one store; each writes only below its own
/// [`namespace`](TransportIdentity::namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportIdentity {
    /// ESME system id
    pub system_id: String,
    /// SMSC host
    pub host: String,
    /// SMSC port
    pub port: u16,
}

impl TransportIdentity {
    /// Create identity
    pub fn new(system_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            system_id: system_id.into(),
            host: host.into(),
            port,
        }
    }

    /// Key prefix `system_id@host:port`.
    ///
    /// `%`, `@`, `:` and `#` inside the components are percent-escaped, so the
    /// prefix is injective and never contains the `#` that separates it from
    /// the key suffix.
    pub fn namespace(&self) -> String {
        format!(
            "{}@{}:{}",
            escape_component(&self.system_id),
            escape_component(&self.host),
            self.port
        )
    }
}

impl fmt::Display for TransportIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.system_id, self.host, self.port)
    }
}

fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '@' => escaped.push_str("%40"),
            ':' => escaped.push_str("%3A"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_namespace() {
        let identity = TransportIdentity::new("esme1", "smsc.example.com", 2775);
        assert_eq!(identity.namespace(), "esme1@smsc.example.com:2775");
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        // Would both read "a@b@c:1" unescaped
        let left = TransportIdentity::new("a@b", "c", 1);
        let right = TransportIdentity::new("a", "b@c", 1);

        assert_eq!(left.namespace(), "a%40b@c:1");
        assert_eq!(right.namespace(), "a@b%40c:1");
        assert_ne!(left.namespace(), right.namespace());
    }

    #[test]
    fn test_ipv6_host() {
        let identity = TransportIdentity::new("esme", "::1", 2775);
        assert_eq!(identity.namespace(), "esme@%3A%3A1:2775");
        assert!(!identity.namespace().contains('#'));
    }
}

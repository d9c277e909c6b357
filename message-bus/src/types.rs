//! Type definitions for message bus

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted routing key, e.g. `sms.ack.smpp_transport`.
///
/// Every segment is sanitized so the key is always a valid NATS subject:
/// no empty tokens, no wildcards, no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Build a routing key from individual segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| sanitize_segment(s.as_ref()))
            .collect::<Vec<_>>()
            .join(".");
        RoutingKey(joined)
    }

    /// Parse an already-dotted key, rejecting empty segments and wildcards
    pub fn parse(raw: &str) -> crate::Result<Self> {
        if raw.is_empty() {
            return Err(crate::Error::InvalidRoutingKey("empty key".to_string()));
        }
        for segment in raw.split('.') {
            if segment.is_empty() || sanitize_segment(segment) != segment {
                return Err(crate::Error::InvalidRoutingKey(raw.to_string()));
            }
        }
        Ok(RoutingKey(raw.to_string()))
    }

    /// Key as NATS subject
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a segment
    pub fn child(&self, segment: &str) -> Self {
        RoutingKey(format!("{}.{}", self.0, sanitize_segment(segment)))
    }

    /// JetStream stream name owning this key (first two segments, upper-cased)
    pub fn stream_name(&self) -> String {
        self.0
            .split('.')
            .take(2)
            .map(|s| s.to_ascii_uppercase().replace(['-', '+'], "_"))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Subject filter captured by [`RoutingKey::stream_name`]
    pub fn stream_subjects(&self) -> Vec<String> {
        let root = self.0.split('.').take(2).collect::<Vec<_>>().join(".");
        vec![root.clone(), format!("{}.>", root)]
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sanitize string for use as a single NATS subject token
fn sanitize_segment(s: &str) -> String {
    if s.is_empty() {
        return "_".to_string();
    }
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

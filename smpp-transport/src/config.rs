//! Configuration for the transport

use crate::error::{Result, TransportError};
use crate::identity::TransportIdentity;
use crate::routing::RoutingTable;
use crate::session::{BindParams, SequenceNumber, MAX_SEQUENCE_NUMBER};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport name, scopes every routing key
    pub transport_name: String,

    /// Sequence number used when nothing is persisted yet
    pub smpp_offset: SequenceNumber,

    /// SMSC bind
    pub smpp: SmppConfig,

    /// Sender address routing
    pub routing: RoutingTable,

    /// Pending-submission expiry policy
    pub pending: PendingPolicy,

    /// Redis configuration
    pub redis: RedisConfig,

    /// NATS configuration
    pub nats: NatsSettings,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_name: "fallback".to_string(),
            smpp_offset: 0,
            smpp: SmppConfig::default(),
            routing: RoutingTable::default(),
            pending: PendingPolicy::default(),
            redis: RedisConfig::default(),
            nats: NatsSettings::default(),
        }
    }
}

/// SMSC bind configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmppConfig {
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

impl Default for SmppConfig {
    fn default() -> Self {
        Self {
            system_id: "smppclient".to_string(),
            password: String::new(),
            system_type: String::new(),
            host: "localhost".to_string(),
            port: 2775,
        }
    }
}

/// What happens to pending entries that never see a submit_sm_resp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingPolicy {
    /// Seconds a pending entry lives; 0 keeps entries forever
    pub ttl_secs: u64,
    /// Retire the pending entry when a temp fault is reported for it
    pub retire_on_temp_fault: bool,
}

impl Default for PendingPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            retire_on_temp_fault: false,
        }
    }
}

impl PendingPolicy {
    /// Expiry applied to new pending entries
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL
    pub url: String,
    /// Logical database
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            db: 0,
        }
    }
}

/// NATS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsSettings {
    /// Server URL
    pub url: String,
    /// Durable, redelivering queues
    pub use_jetstream: bool,
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            use_jetstream: true,
        }
    }
}

impl TransportConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TransportError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override fields from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("SMPP_TRANSPORT_NAME") {
            self.transport_name = name;
        }
        if let Some(offset) = lookup("SMPP_OFFSET") {
            self.smpp_offset = parse_var("SMPP_OFFSET", &offset)?;
        }
        if let Some(system_id) = lookup("SMPP_SYSTEM_ID") {
            self.smpp.system_id = system_id;
        }
        if let Some(password) = lookup("SMPP_PASSWORD") {
            self.smpp.password = password;
        }
        if let Some(host) = lookup("SMPP_HOST") {
            self.smpp.host = host;
        }
        if let Some(port) = lookup("SMPP_PORT") {
            self.smpp.port = parse_var("SMPP_PORT", &port)?;
        }
        if let Some(country_code) = lookup("SMPP_COUNTRY_CODE") {
            self.routing.country_code = country_code;
        }
        if let Some(ttl) = lookup("SMPP_PENDING_TTL_SECS") {
            self.pending.ttl_secs = parse_var("SMPP_PENDING_TTL_SECS", &ttl)?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(db) = lookup("REDIS_DB") {
            self.redis.db = parse_var("REDIS_DB", &db)?;
        }
        if let Some(url) = lookup("NATS_URL") {
            self.nats.url = url;
        }
        Ok(())
    }

    /// Reject unusable configurations; warn about unroutable operators
    pub fn validate(&self) -> Result<()> {
        if self.transport_name.trim().is_empty() {
            return Err(TransportError::Config("transport_name must not be empty".to_string()));
        }
        if self.smpp.system_id.is_empty() || self.smpp.host.is_empty() {
            return Err(TransportError::Config(
                "smpp.system_id and smpp.host are required".to_string(),
            ));
        }
        if self.smpp.port == 0 {
            return Err(TransportError::Config("smpp.port must not be 0".to_string()));
        }
        if self.smpp_offset >= MAX_SEQUENCE_NUMBER {
            return Err(TransportError::Config(format!(
                "smpp_offset {} outside sequence range 0..{}",
                self.smpp_offset, MAX_SEQUENCE_NUMBER
            )));
        }
        for operator in self.routing.unrouted_operators() {
            warn!("Operator {} has prefixes but no operator_number", operator);
        }
        Ok(())
    }

    /// Identity used to namespace store keys
    pub fn identity(&self) -> TransportIdentity {
        TransportIdentity::new(&self.smpp.system_id, &self.smpp.host, self.smpp.port)
    }

    /// Bind parameters for the session
    pub fn bind_params(&self) -> BindParams {
        BindParams {
            system_id: self.smpp.system_id.clone(),
            password: self.smpp.password.clone(),
            system_type: self.smpp.system_type.clone(),
            host: self.smpp.host.clone(),
            port: self.smpp.port,
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| TransportError::Config(format!("{}={:?}: {}", name, raw, e)))
}

//! Shared harness: in-memory store and fabric around a loopback SMSC

#![allow(dead_code)]

use message_bus::{AckOutcome, MemoryFabric, Message, RoutingKey};
use serde_json::json;
use smpp_transport::events::routing_keys;
use smpp_transport::routing::RoutingTable;
use smpp_transport::session::{LoopbackSmsc, SimulatorConfig};
use smpp_transport::store::MemoryStore;
use smpp_transport::{SequenceStore, SmppTransport, TransportConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TRANSPORT: &str = "smpp_za";

/// Transport routing `0831…` to operator `op1`, sending from `2233`
pub fn za_config() -> TransportConfig {
    let mut config = TransportConfig::default();
    config.transport_name = TRANSPORT.to_string();
    config.smpp.system_id = "esme1".to_string();
    config.smpp.host = "smsc.example.com".to_string();
    config.routing = RoutingTable {
        country_code: "27".to_string(),
        operator_prefix: BTreeMap::from([("0831".to_string(), "op1".to_string())]),
        operator_number: BTreeMap::from([("op1".to_string(), "2233".to_string())]),
    };
    config
}

/// Simulator that only answers what tests inject, plus temp faults
pub fn manual_simulator() -> SimulatorConfig {
    SimulatorConfig {
        auto_ack: false,
        ..Default::default()
    }
}

pub struct Harness {
    pub config: TransportConfig,
    pub smsc: LoopbackSmsc,
    pub store: Arc<MemoryStore>,
    pub fabric: Arc<MemoryFabric>,
}

impl Harness {
    pub fn new(config: TransportConfig, simulator: SimulatorConfig) -> Self {
        Self {
            config,
            smsc: LoopbackSmsc::new(simulator),
            store: Arc::new(MemoryStore::new()),
            fabric: Arc::new(MemoryFabric::new()),
        }
    }

    pub fn transport(&self) -> SmppTransport {
        SmppTransport::new(
            &self.config,
            Arc::new(self.smsc.clone()),
            self.store.clone(),
            self.fabric.clone(),
        )
    }

    /// Started transport that has handled its connect event
    pub async fn connected(&self) -> SmppTransport {
        let mut transport = self.transport();
        transport.start().await.unwrap();
        assert!(transport.step().await.unwrap());
        transport
    }

    /// View of the transport's keys in the shared store
    pub fn sequences(&self) -> SequenceStore {
        SequenceStore::new(
            self.store.clone(),
            &self.config.identity(),
            self.config.smpp_offset,
            self.config.pending.ttl(),
        )
    }

    pub fn enqueue(&self, id: &str, to_msisdn: &str) -> Message {
        self.fabric.enqueue(
            &routing_keys::outbound(&self.config.transport_name),
            json!({"id": id, "to_msisdn": to_msisdn, "message": "hello world"}),
        )
    }

    pub fn published_on(&self, key: RoutingKey) -> Vec<serde_json::Value> {
        self.fabric
            .published_on(&key)
            .into_iter()
            .map(|m| m.payload)
            .collect()
    }

    pub fn outcomes(&self) -> Vec<AckOutcome> {
        self.fabric.acks().into_iter().map(|r| r.outcome).collect()
    }
}

//! Connection lifecycle and the transport event loop

use crate::config::{PendingPolicy, TransportConfig};
use crate::dispatcher;
use crate::error::{Result, TransportError};
use crate::events::{routing_keys, OutboundMessage, TransportPublisher};
use crate::identity::TransportIdentity;
use crate::inbound;
use crate::metrics::{HANDLER_FAILURES_TOTAL, LAST_SEQUENCE, SESSION_EVENTS_TOTAL};
use crate::routing::RoutingTable;
use crate::sequence::SequenceStore;
use crate::session::{
    dispatch_event, BindParams, DeliverSm, DeliveryReport, EsmeHandler, EsmeSession, Pdu,
    SequenceNumber, SessionConnector, SessionEvent, SessionEvents,
};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use futures::StreamExt;
use message_bus::{Delivery, DeliveryStream, MessageFabric};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created, not started
    Uninitialized,
    /// Session established
    Running,
    /// Stopped; cannot be restarted
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Resources owned while running
pub(crate) struct RunningSession {
    pub(crate) session: Box<dyn EsmeSession>,
    pub(crate) events: SessionEvents,
    pub(crate) sequences: SequenceStore,
    pub(crate) publisher: Option<TransportPublisher>,
    pub(crate) outbound: Option<DeliveryStream>,
    pub(crate) starting_sequence: SequenceNumber,
}

impl RunningSession {
    /// Sequence store and publisher; the publisher exists once connected
    pub(crate) fn endpoints(&self) -> Result<(SequenceStore, TransportPublisher)> {
        let publisher = self.publisher.clone().ok_or(TransportError::NotConnected)?;
        Ok((self.sequences.clone(), publisher))
    }
}

pub(crate) enum ContextState {
    Uninitialized,
    Running(RunningSession),
    Stopped,
}

impl ContextState {
    pub(crate) fn lifecycle(&self) -> Lifecycle {
        match self {
            ContextState::Uninitialized => Lifecycle::Uninitialized,
            ContextState::Running(_) => Lifecycle::Running,
            ContextState::Stopped => Lifecycle::Stopped,
        }
    }

    pub(crate) fn running_mut(&mut self) -> Result<&mut RunningSession> {
        match self {
            ContextState::Running(running) => Ok(running),
            other => Err(TransportError::InvalidLifecycle {
                expected: Lifecycle::Running,
                actual: other.lifecycle(),
            }),
        }
    }
}

/// State every handler operates on
pub struct SessionContext {
    pub(crate) transport_name: String,
    pub(crate) routing: RoutingTable,
    pub(crate) pending: PendingPolicy,
    pub(crate) state: ContextState,
}

impl SessionContext {
    fn new(config: &TransportConfig) -> Self {
        Self {
            transport_name: config.transport_name.clone(),
            routing: config.routing.clone(),
            pending: config.pending.clone(),
            state: ContextState::Uninitialized,
        }
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle()
    }

    /// Transport name
    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }
}

enum Input {
    Event(SessionEvent),
    Delivery(message_bus::Result<Delivery>),
    OutboundClosed,
    SessionClosed,
}

/// SMPP transport worker
pub struct SmppTransport {
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn KeyValueStore>,
    fabric: Arc<dyn MessageFabric>,
    identity: TransportIdentity,
    bind: BindParams,
    offset: SequenceNumber,
    context: SessionContext,
}

impl SmppTransport {
    /// Create transport; nothing is connected until [`SmppTransport::start`]
    pub fn new(
        config: &TransportConfig,
        connector: Arc<dyn SessionConnector>,
        store: Arc<dyn KeyValueStore>,
        fabric: Arc<dyn MessageFabric>,
    ) -> Self {
        Self {
            connector,
            store,
            fabric,
            identity: config.identity(),
            bind: config.bind_params(),
            offset: config.smpp_offset,
            context: SessionContext::new(config),
        }
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.context.lifecycle()
    }

    /// Identity namespacing this transport's keys
    pub fn identity(&self) -> &TransportIdentity {
        &self.identity
    }

    /// Sequence number the session was seeded with, while running
    pub fn starting_sequence(&self) -> Option<SequenceNumber> {
        match &self.context.state {
            ContextState::Running(running) => Some(running.starting_sequence),
            _ => None,
        }
    }

    /// Load the last sequence number and establish the session
    pub async fn start(&mut self) -> Result<()> {
        let actual = self.lifecycle();
        if actual != Lifecycle::Uninitialized {
            return Err(TransportError::InvalidLifecycle {
                expected: Lifecycle::Uninitialized,
                actual,
            });
        }

        let sequences = SequenceStore::new(
            self.store.clone(),
            &self.identity,
            self.offset,
            self.context.pending.ttl(),
        );
        let starting_sequence = sequences.starting_sequence().await?;
        info!(
            "🚀 Starting transport {} as {} from sequence {}",
            self.context.transport_name, self.identity, starting_sequence
        );

        let handle = self.connector.connect(&self.bind, starting_sequence).await?;
        LAST_SEQUENCE.set(i64::from(starting_sequence));

        self.context.state = ContextState::Running(RunningSession {
            session: handle.session,
            events: handle.events,
            sequences,
            publisher: None,
            outbound: None,
            starting_sequence,
        });
        Ok(())
    }

    /// Close the session; persisted state is left untouched
    pub async fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.context.state, ContextState::Stopped) {
            ContextState::Running(mut running) => {
                running.session.close().await;
                info!("🛑 Transport {} stopped", self.context.transport_name);
            }
            ContextState::Uninitialized => {
                debug!("Transport {} stopped before start", self.context.transport_name);
            }
            ContextState::Stopped => {}
        }
        Ok(())
    }

    /// Submit one outbound message
    pub async fn dispatch(&mut self, message: &OutboundMessage) -> Result<SequenceNumber> {
        dispatcher::dispatch(&mut self.context, message).await
    }

    /// Handle the next session event or outbound delivery.
    ///
    /// Returns `Ok(false)` once the session's event stream has ended.
    pub async fn step(&mut self) -> Result<bool> {
        let input = self.next_input().await?;
        self.handle_input(input).await
    }

    /// Process session events and outbound deliveries until `shutdown`
    /// completes or the session ends. Handler failures are logged and
    /// counted; the loop carries on with the next input.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.context.state.running_mut()?;
        tokio::pin!(shutdown);

        loop {
            let input = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested for transport {}", self.context.transport_name);
                    break;
                }
                input = self.next_input() => input?,
            };

            match self.handle_input(input).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => self.record_failure(&e),
            }
        }
        Ok(())
    }

    async fn next_input(&mut self) -> Result<Input> {
        let running = self.context.state.running_mut()?;
        let outbound = running.outbound.as_mut();

        let input = tokio::select! {
            biased;
            event = running.events.next() => match event {
                Some(event) => Input::Event(event),
                None => Input::SessionClosed,
            },
            delivery = next_delivery(outbound) => match delivery {
                Some(delivery) => Input::Delivery(delivery),
                None => Input::OutboundClosed,
            },
        };
        Ok(input)
    }

    async fn handle_input(&mut self, input: Input) -> Result<bool> {
        match input {
            Input::Event(event) => {
                SESSION_EVENTS_TOTAL.with_label_values(&[event.kind()]).inc();
                dispatch_event(self, event).await?;
            }
            Input::Delivery(Ok(delivery)) => {
                dispatcher::handle_delivery(&mut self.context, delivery).await?;
            }
            Input::Delivery(Err(e)) => return Err(e.into()),
            Input::OutboundClosed => {
                warn!("Outbound queue closed for transport {}", self.context.transport_name);
                self.context.state.running_mut()?.outbound = None;
            }
            Input::SessionClosed => {
                warn!("Session event stream ended for transport {}", self.context.transport_name);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn record_failure(&self, e: &TransportError) {
        HANDLER_FAILURES_TOTAL
            .with_label_values(&[e.kind().as_str()])
            .inc();
        error!(
            "❌ Transport {} handler failed ({}): {}",
            self.context.transport_name,
            e.kind().as_str(),
            e
        );
    }
}

async fn next_delivery(
    outbound: Option<&mut DeliveryStream>,
) -> Option<message_bus::Result<Delivery>> {
    match outbound {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

#[async_trait]
impl EsmeHandler for SmppTransport {
    async fn on_connect(&mut self) -> Result<()> {
        let transport_name = self.context.transport_name.clone();
        let running = self.context.state.running_mut()?;

        if running.publisher.is_none() {
            running.publisher = Some(TransportPublisher::new(
                self.fabric.clone(),
                transport_name.clone(),
            ));
        }
        if running.outbound.is_none() {
            let queue = routing_keys::outbound(&transport_name);
            running.outbound = Some(self.fabric.consume(&queue).await?);
            info!("📥 Consuming {}", queue);
        }
        info!("✅ Transport {} connected", transport_name);
        Ok(())
    }

    async fn on_disconnect(&mut self) -> Result<()> {
        self.context.state.running_mut()?;
        warn!("Transport {} disconnected", self.context.transport_name);
        Ok(())
    }

    async fn on_submit_sm_resp(
        &mut self,
        sequence_number: SequenceNumber,
        message_id: String,
    ) -> Result<()> {
        inbound::on_submit_sm_resp(&mut self.context, sequence_number, message_id).await
    }

    async fn on_delivery_report(&mut self, report: DeliveryReport) -> Result<()> {
        inbound::on_delivery_report(&mut self.context, report).await
    }

    async fn on_deliver_sm(&mut self, deliver: DeliverSm) -> Result<()> {
        inbound::on_deliver_sm(&mut self.context, deliver).await
    }

    async fn on_send_failure(&mut self, message: serde_json::Value, reason: String) -> Result<()> {
        inbound::on_send_failure(&mut self.context, message, reason).await
    }

    async fn on_temp_fault(&mut self, pdu: Pdu) -> Result<()> {
        inbound::on_temp_fault(&mut self.context, pdu).await
    }
}

//! Loopback SMSC
//!
//! Answers every submit_sm in-process: a submit_sm_resp with a generated
//! message id, optionally followed by a delivery receipt. Faults and
//! rejections can be scheduled, and arbitrary events injected.

use super::{
    next_sequence_number, BindParams, CommandStatus, DeliveryReport, EsmeSession, Pdu, PduHeader,
    SequenceNumber, SessionConnector, SessionError, SessionEvent, SessionHandle, SubmitSm,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

/// command_id of submit_sm_resp
const SUBMIT_SM_RESP: u32 = 0x8000_0004;

/// Loopback behaviour
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Answer submissions with submit_sm_resp
    pub auto_ack: bool,
    /// Follow each submit_sm_resp with a delivery receipt
    pub delivery_reports: bool,
    /// `stat` used in receipts
    pub delivery_status: String,
}

impl SimulatorConfig {
    /// Accept submissions without answering them; no acks, no receipts
    pub fn passive() -> Self {
        Self {
            auto_ack: false,
            delivery_reports: false,
            ..Default::default()
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            auto_ack: true,
            delivery_reports: true,
            delivery_status: "DELIVRD".to_string(),
        }
    }
}

#[derive(Default)]
struct SmscState {
    generation: u64,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    submitted: Vec<(SequenceNumber, SubmitSm)>,
    binds: Vec<SequenceNumber>,
    reject_submissions: bool,
    temp_faults: VecDeque<CommandStatus>,
}

/// In-process SMSC; clones share state
#[derive(Clone, Default)]
pub struct LoopbackSmsc {
    config: SimulatorConfig,
    state: Arc<Mutex<SmscState>>,
}

impl LoopbackSmsc {
    /// Create simulator
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SmscState::default())),
        }
    }

    /// Push an event into the bound session; false when nothing is bound
    pub fn inject(&self, event: SessionEvent) -> bool {
        match &self.state.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Every accepted submit_sm with its sequence number
    pub fn submitted(&self) -> Vec<(SequenceNumber, SubmitSm)> {
        self.state.lock().submitted.clone()
    }

    /// Last sequence number handed to each bind, in bind order
    pub fn binds(&self) -> Vec<SequenceNumber> {
        self.state.lock().binds.clone()
    }

    /// Refuse submissions until reset
    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }

    /// Answer the next submission with a temp fault instead of an ack
    pub fn temp_fault_next(&self, status: CommandStatus) {
        self.state.lock().temp_faults.push_back(status);
    }
}

#[async_trait]
impl SessionConnector for LoopbackSmsc {
    async fn connect(
        &self,
        bind: &BindParams,
        last_sequence_number: SequenceNumber,
    ) -> Result<SessionHandle, SessionError> {
        info!(
            "Loopback SMSC bound by {} ({}:{}), last sequence {}",
            bind.system_id, bind.host, bind.port, last_sequence_number
        );

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is held locally, send cannot fail
        let _ = tx.send(SessionEvent::Connected);

        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.events = Some(tx);
            state.binds.push(last_sequence_number);
            state.generation
        };

        let session = LoopbackSession {
            generation,
            last_sequence: last_sequence_number,
            config: self.config.clone(),
            state: self.state.clone(),
        };

        Ok(SessionHandle {
            session: Box::new(session),
            events: UnboundedReceiverStream::new(rx).boxed(),
        })
    }
}

struct LoopbackSession {
    generation: u64,
    last_sequence: SequenceNumber,
    config: SimulatorConfig,
    state: Arc<Mutex<SmscState>>,
}

impl LoopbackSession {
    fn receipt(&self, message_id: &str, pdu: &SubmitSm) -> DeliveryReport {
        let now = Utc::now();
        DeliveryReport {
            id: message_id.to_string(),
            sub: Some("001".to_string()),
            dlvrd: Some("001".to_string()),
            submit_date: Some(now.format("%y%m%d%H%M").to_string()),
            done_date: now.format("%y%m%d%H%M%S").to_string(),
            stat: self.config.delivery_status.clone(),
            err: Some("000".to_string()),
            text: Some(String::from_utf8_lossy(&pdu.short_message).chars().take(20).collect()),
        }
    }
}

#[async_trait]
impl EsmeSession for LoopbackSession {
    async fn submit_sm(&mut self, pdu: SubmitSm) -> Result<SequenceNumber, SessionError> {
        let mut state = self.state.lock();
        if state.generation != self.generation {
            return Err(SessionError::Closed);
        }
        let events = state.events.clone().ok_or(SessionError::Closed)?;
        if state.reject_submissions {
            warn!("Loopback SMSC rejecting submit_sm to {}", pdu.destination_addr);
            return Err(SessionError::Rejected("ESME_RSUBMITFAIL".to_string()));
        }

        let sequence_number = next_sequence_number(self.last_sequence);
        self.last_sequence = sequence_number;

        let mut responses = Vec::new();
        if let Some(status) = state.temp_faults.pop_front() {
            responses.push(SessionEvent::TempFault(Pdu {
                header: PduHeader {
                    command_id: SUBMIT_SM_RESP,
                    command_status: status,
                    sequence_number,
                },
                body: Default::default(),
            }));
        } else if self.config.auto_ack {
            let message_id = Uuid::new_v4().simple().to_string();
            if self.config.delivery_reports {
                responses.push(SessionEvent::SubmitSmResp {
                    sequence_number,
                    message_id: message_id.clone(),
                });
                responses.push(SessionEvent::DeliveryReport(self.receipt(&message_id, &pdu)));
            } else {
                responses.push(SessionEvent::SubmitSmResp {
                    sequence_number,
                    message_id,
                });
            }
        }

        state.submitted.push((sequence_number, pdu));
        for event in responses {
            let _ = events.send(event);
        }

        Ok(sequence_number)
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.events = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind() -> BindParams {
        BindParams {
            system_id: "esme".to_string(),
            password: "secret".to_string(),
            system_type: String::new(),
            host: "localhost".to_string(),
            port: 2775,
        }
    }

    fn submit(to: &str) -> SubmitSm {
        SubmitSm {
            source_addr: "2233".to_string(),
            destination_addr: to.to_string(),
            short_message: bytes::Bytes::from_static(b"hello world"),
        }
    }

    #[tokio::test]
    async fn test_numbers_continue_after_seed() {
        let smsc = LoopbackSmsc::default();
        let mut handle = smsc.connect(&bind(), 41).await.unwrap();

        assert_eq!(handle.events.next().await, Some(SessionEvent::Connected));
        assert_eq!(handle.session.submit_sm(submit("+27831234567")).await.unwrap(), 42);
        assert_eq!(handle.session.submit_sm(submit("+27831234568")).await.unwrap(), 43);
        assert_eq!(smsc.binds(), vec![41]);
    }

    #[tokio::test]
    async fn test_ack_then_receipt() {
        let smsc = LoopbackSmsc::new(SimulatorConfig::default());
        let mut handle = smsc.connect(&bind(), 0).await.unwrap();
        handle.events.next().await;

        handle.session.submit_sm(submit("+27831234567")).await.unwrap();

        let ack = handle.events.next().await.unwrap();
        let receipt = handle.events.next().await.unwrap();
        match (ack, receipt) {
            (
                SessionEvent::SubmitSmResp {
                    sequence_number,
                    message_id,
                },
                SessionEvent::DeliveryReport(report),
            ) => {
                assert_eq!(sequence_number, 1);
                assert_eq!(report.id, message_id);
                assert_eq!(report.stat, "DELIVRD");
                assert_eq!(report.done_date.len(), 12);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scheduled_temp_fault_and_rejection() {
        let smsc = LoopbackSmsc::default();
        let mut handle = smsc.connect(&bind(), 0).await.unwrap();
        handle.events.next().await;

        smsc.temp_fault_next(CommandStatus::THROTTLED);
        handle.session.submit_sm(submit("+27831234567")).await.unwrap();
        match handle.events.next().await {
            Some(SessionEvent::TempFault(pdu)) => {
                assert_eq!(pdu.header.sequence_number, 1);
                assert_eq!(pdu.header.command_status, CommandStatus::THROTTLED);
            }
            other => panic!("unexpected event {:?}", other),
        }

        smsc.reject_submissions(true);
        assert!(matches!(
            handle.session.submit_sm(submit("+27831234567")).await,
            Err(SessionError::Rejected(_))
        ));
        assert_eq!(smsc.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_passive_simulator_never_answers() {
        let smsc = LoopbackSmsc::new(SimulatorConfig::passive());
        let mut handle = smsc.connect(&bind(), 0).await.unwrap();

        assert_eq!(handle.session.submit_sm(submit("+27831234567")).await.unwrap(), 1);
        handle.session.close().await;

        assert_eq!(handle.events.next().await, Some(SessionEvent::Connected));
        assert_eq!(handle.events.next().await, None);
        assert_eq!(smsc.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_refuses_submissions() {
        let smsc = LoopbackSmsc::default();
        let mut handle = smsc.connect(&bind(), 0).await.unwrap();

        handle.session.close().await;
        assert!(!smsc.inject(SessionEvent::Disconnected));
        assert!(matches!(
            handle.session.submit_sm(submit("+27831234567")).await,
            Err(SessionError::Closed)
        ));
    }
}

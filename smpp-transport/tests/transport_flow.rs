//! End-to-end flows through the transport with a loopback SMSC

mod common;

use common::{manual_simulator, za_config, Harness, TRANSPORT};
use message_bus::AckOutcome;
use serde_json::json;
use smpp_transport::events::routing_keys;
use smpp_transport::session::{
    CommandStatus, DeliveryReport, EsmeHandler, Pdu, PduHeader, SessionEvent, SimulatorConfig,
};
use smpp_transport::{ErrorKind, Lifecycle, TransportError};
use std::time::Duration;

fn report(id: &str, done_date: &str) -> DeliveryReport {
    DeliveryReport {
        id: id.to_string(),
        sub: Some("001".to_string()),
        dlvrd: Some("001".to_string()),
        submit_date: Some("1309020707".to_string()),
        done_date: done_date.to_string(),
        stat: "DELIVRD".to_string(),
        err: Some("000".to_string()),
        text: None,
    }
}

#[tokio::test]
async fn test_dispatch_resolves_source_and_records_pending() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    h.enqueue("m1", "+27831234567");
    transport.step().await.unwrap();

    let submitted = h.smsc.submitted();
    assert_eq!(submitted.len(), 1);
    let (sequence_number, pdu) = &submitted[0];
    assert_eq!(pdu.source_addr, "2233");
    assert_eq!(pdu.destination_addr, "+27831234567");
    assert_eq!(&pdu.short_message[..], b"hello world");

    let sequences = h.sequences();
    assert_eq!(
        sequences.get_pending(*sequence_number).await.unwrap(),
        Some("m1".to_string())
    );
    assert_eq!(
        sequences.get_last_sequence().await.unwrap(),
        Some(*sequence_number)
    );
    assert_eq!(h.outcomes(), vec![AckOutcome::Ack]);
}

#[tokio::test]
async fn test_submit_sm_resp_publishes_ack_and_retires_pending() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    h.enqueue("m1", "+27831234567");
    transport.step().await.unwrap();
    let sequence_number = h.smsc.submitted()[0].0;

    assert!(h.smsc.inject(SessionEvent::SubmitSmResp {
        sequence_number,
        message_id: "abc123".to_string(),
    }));
    transport.step().await.unwrap();

    assert_eq!(
        h.published_on(routing_keys::ack(TRANSPORT)),
        vec![json!({"id": "m1", "transport_message_id": "abc123"})]
    );
    assert_eq!(h.sequences().get_pending(sequence_number).await.unwrap(), None);
}

#[tokio::test]
async fn test_submit_sm_resp_for_unknown_sequence_has_null_id() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    transport
        .on_submit_sm_resp(4242, "def456".to_string())
        .await
        .unwrap();

    assert_eq!(
        h.published_on(routing_keys::ack(TRANSPORT)),
        vec![json!({"id": null, "transport_message_id": "def456"})]
    );
}

#[tokio::test]
async fn test_delivery_report_publishes_receipt() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    h.smsc
        .inject(SessionEvent::DeliveryReport(report("abc123", "130902070735")));
    transport.step().await.unwrap();

    assert_eq!(
        h.published_on(routing_keys::receipt(TRANSPORT)),
        vec![json!({
            "transport_name": TRANSPORT,
            "transport_msg_id": "abc123",
            "transport_status": "DELIVRD",
            "transport_delivered_at": "2013-09-02T07:07:35",
        })]
    );
}

#[tokio::test]
async fn test_malformed_done_date_is_fatal() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    let err = transport
        .on_delivery_report(report("abc123", "2013-09-02 07:07"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedTimestamp);
    assert!(err.is_fatal());
    assert!(h.published_on(routing_keys::receipt(TRANSPORT)).is_empty());
}

#[tokio::test]
async fn test_submission_failure_naks_without_persisting() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;
    h.smsc.reject_submissions(true);

    h.enqueue("m1", "+27831234567");
    let err = transport.step().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProtocolSubmissionFailure);
    assert_eq!(h.outcomes(), vec![AckOutcome::Nak]);
    assert!(h.store.keys().is_empty());
}

#[tokio::test]
async fn test_store_failure_after_submit_acks_delivery() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;
    h.store.set_unavailable(true);

    h.enqueue("m1", "+27831234567");
    let err = transport.step().await.unwrap_err();

    assert!(matches!(err, TransportError::StoreUnavailable(_)));
    assert!(err.is_fatal());
    // Already with the SMSC; redelivering would send it twice
    assert_eq!(h.smsc.submitted().len(), 1);
    assert_eq!(h.outcomes(), vec![AckOutcome::Ack]);
}

#[tokio::test]
async fn test_store_unavailable_fails_ack_handler() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;
    h.store.set_unavailable(true);

    let err = transport
        .on_submit_sm_resp(1, "abc123".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(h.published_on(routing_keys::ack(TRANSPORT)).is_empty());
}

#[tokio::test]
async fn test_handlers_outside_running_state() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.transport();

    let err = transport
        .on_submit_sm_resp(1, "abc123".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::InvalidLifecycle {
            expected: Lifecycle::Running,
            actual: Lifecycle::Uninitialized
        }
    ));

    transport.start().await.unwrap();
    transport.stop().await.unwrap();

    let err = transport
        .on_delivery_report(report("abc123", "130902070735"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::InvalidLifecycle {
            actual: Lifecycle::Stopped,
            ..
        }
    ));
    assert!(transport.on_connect().await.is_err());
    assert!(transport.on_disconnect().await.is_err());
}

#[tokio::test]
async fn test_disconnect_is_a_noop() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    h.smsc.inject(SessionEvent::Disconnected);
    transport.step().await.unwrap();

    assert_eq!(transport.lifecycle(), Lifecycle::Running);
    assert!(h.fabric.published().is_empty());
}

#[tokio::test]
async fn test_temp_fault_publishes_failure_and_keeps_pending() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;
    h.smsc.temp_fault_next(CommandStatus::MESSAGE_QUEUE_FULL);

    h.enqueue("m1", "+27831234567");
    transport.step().await.unwrap();
    transport.step().await.unwrap();

    let sequence_number = h.smsc.submitted()[0].0;
    assert_eq!(
        h.published_on(routing_keys::failures(TRANSPORT)),
        vec![json!({"message": {"id": "m1"}, "reason": "ESME_RMSGQFUL"})]
    );
    assert_eq!(
        h.sequences().get_pending(sequence_number).await.unwrap(),
        Some("m1".to_string())
    );
}

#[tokio::test]
async fn test_temp_fault_for_unknown_sequence_has_null_id() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    transport
        .on_temp_fault(Pdu {
            header: PduHeader {
                command_id: 0x8000_0004,
                command_status: CommandStatus::MESSAGE_QUEUE_FULL,
                sequence_number: 777,
            },
            body: Default::default(),
        })
        .await
        .unwrap();

    assert_eq!(
        h.published_on(routing_keys::failures(TRANSPORT)),
        vec![json!({"message": {"id": null}, "reason": "ESME_RMSGQFUL"})]
    );
}

#[tokio::test]
async fn test_temp_fault_retires_pending_when_configured() {
    let mut config = za_config();
    config.pending.retire_on_temp_fault = true;
    let h = Harness::new(config, manual_simulator());
    let mut transport = h.connected().await;
    h.smsc.temp_fault_next(CommandStatus::THROTTLED);

    h.enqueue("m1", "+27831234567");
    transport.step().await.unwrap();
    transport.step().await.unwrap();

    let sequence_number = h.smsc.submitted()[0].0;
    assert_eq!(h.sequences().get_pending(sequence_number).await.unwrap(), None);
    assert_eq!(
        h.published_on(routing_keys::failures(TRANSPORT))[0]["reason"],
        "ESME_RTHROTTLED"
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_pending_entry_expires() {
    let mut config = za_config();
    config.pending.ttl_secs = 60;
    let h = Harness::new(config, manual_simulator());
    let mut transport = h.connected().await;

    h.enqueue("m1", "+27831234567");
    transport.step().await.unwrap();
    let sequence_number = h.smsc.submitted()[0].0;

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(h.sequences().get_pending(sequence_number).await.unwrap(), None);
    // The counter never expires
    assert_eq!(
        h.sequences().get_last_sequence().await.unwrap(),
        Some(sequence_number)
    );
}

#[tokio::test]
async fn test_run_loop_round_trip() {
    let h = Harness::new(za_config(), SimulatorConfig::default());
    let mut transport = h.transport();
    transport.start().await.unwrap();

    h.enqueue("m1", "+27831234567");
    h.enqueue("m2", "0831234568");
    // Two acks and two receipts
    transport
        .run_until(h.fabric.wait_for_published(4))
        .await
        .unwrap();

    let acks = h.published_on(routing_keys::ack(TRANSPORT));
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0]["id"], "m1");
    assert_eq!(acks[1]["id"], "m2");

    let receipts = h.published_on(routing_keys::receipt(TRANSPORT));
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[0]["transport_status"], "DELIVRD");
    assert_eq!(receipts[0]["transport_msg_id"], acks[0]["transport_message_id"]);

    let submitted = h.smsc.submitted();
    assert_eq!(submitted[0].0 + 1, submitted[1].0);
    assert!(submitted.iter().all(|(_, pdu)| pdu.source_addr == "2233"));
    // Both pending entries retired, only the counter remains
    assert_eq!(h.store.keys(), vec![h.sequences().last_sequence_key()]);
    assert_eq!(h.outcomes(), vec![AckOutcome::Ack, AckOutcome::Ack]);
}

#[tokio::test]
async fn test_run_loop_survives_handler_failure() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.transport();
    transport.start().await.unwrap();

    h.smsc.inject(SessionEvent::DeliveryReport(report("bad", "99")));
    h.smsc
        .inject(SessionEvent::DeliveryReport(report("good", "130902070735")));
    transport
        .run_until(h.fabric.wait_for_published(1))
        .await
        .unwrap();

    let receipts = h.published_on(routing_keys::receipt(TRANSPORT));
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["transport_msg_id"], "good");
}

#[tokio::test]
async fn test_run_loop_ends_with_session() {
    let h = Harness::new(za_config(), manual_simulator());
    let mut transport = h.connected().await;

    // A second bind on the same simulator drops the first session's events
    let mut other = h.transport();
    other.start().await.unwrap();

    transport
        .run_until(std::future::pending())
        .await
        .unwrap();
    assert_eq!(transport.lifecycle(), Lifecycle::Running);
}

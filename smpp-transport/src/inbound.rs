//! Inbound event handlers

use crate::error::{Result, TransportError};
use crate::events::{parse_done_date, AckEvent, FailureEvent, ReceiptEvent};
use crate::metrics::LOOKUP_MISSES_TOTAL;
use crate::sequence::SequenceStore;
use crate::session::{DeliverSm, DeliveryReport, Pdu, SequenceNumber};
use crate::transport::SessionContext;
use serde_json::json;
use tracing::{debug, info, warn};

/// Destination segment used when a deliver_sm has no destination_addr
pub const UNKNOWN_DESTINATION: &str = "unknown";

/// Pending message id for `sequence_number`; a miss is logged, never fatal
async fn lookup_pending(
    sequences: &SequenceStore,
    sequence_number: SequenceNumber,
) -> Result<Option<String>> {
    let id = sequences.get_pending(sequence_number).await?;
    if id.is_none() {
        let miss = TransportError::LookupMiss {
            table: "pending",
            key: sequence_number.to_string(),
        };
        LOOKUP_MISSES_TOTAL.with_label_values(&["pending"]).inc();
        warn!("{}", miss);
    }
    Ok(id)
}

/// submit_sm_resp: retire the pending entry and publish the ack
pub async fn on_submit_sm_resp(
    ctx: &mut SessionContext,
    sequence_number: SequenceNumber,
    message_id: String,
) -> Result<()> {
    let (sequences, publisher) = ctx.state.running_mut()?.endpoints()?;

    let id = lookup_pending(&sequences, sequence_number).await?;
    if id.is_some() {
        sequences.delete_pending(sequence_number).await?;
    }

    debug!(
        "submit_sm_resp for sequence {}: {:?} → {}",
        sequence_number, id, message_id
    );
    publisher
        .publish_ack(&AckEvent {
            id,
            transport_message_id: message_id,
        })
        .await?;
    Ok(())
}

/// Delivery receipt: publish the final state
pub async fn on_delivery_report(ctx: &mut SessionContext, report: DeliveryReport) -> Result<()> {
    let (_, publisher) = ctx.state.running_mut()?.endpoints()?;
    let delivered_at = parse_done_date(&report.done_date)?;

    info!("Delivery report for {}: {}", report.id, report.stat);
    publisher
        .publish_receipt(&ReceiptEvent {
            transport_name: ctx.transport_name.clone(),
            transport_msg_id: report.id,
            transport_status: report.stat,
            transport_delivered_at: delivered_at,
        })
        .await?;
    Ok(())
}

/// Mobile-originated message: republish the raw fields by destination
pub async fn on_deliver_sm(ctx: &mut SessionContext, deliver: DeliverSm) -> Result<()> {
    let (_, publisher) = ctx.state.running_mut()?.endpoints()?;
    let destination = deliver
        .destination_addr
        .clone()
        .unwrap_or_else(|| UNKNOWN_DESTINATION.to_string());

    let payload = serde_json::to_value(&deliver)?;
    publisher.publish_inbound(&destination, payload).await?;
    Ok(())
}

/// The session gave up on a message
pub async fn on_send_failure(
    ctx: &mut SessionContext,
    message: serde_json::Value,
    reason: String,
) -> Result<()> {
    let (_, publisher) = ctx.state.running_mut()?.endpoints()?;

    warn!("Send failure: {}", reason);
    publisher
        .publish_failure(&FailureEvent { message, reason })
        .await?;
    Ok(())
}

/// Transient fault for a submitted PDU: publish a failure for the originating id
pub async fn on_temp_fault(ctx: &mut SessionContext, pdu: Pdu) -> Result<()> {
    let (sequences, publisher) = ctx.state.running_mut()?.endpoints()?;
    let sequence_number = pdu.header.sequence_number;
    let status = pdu.header.command_status;

    let id = lookup_pending(&sequences, sequence_number).await?;
    if id.is_some() && ctx.pending.retire_on_temp_fault {
        sequences.delete_pending(sequence_number).await?;
    }

    warn!(
        "Temp fault {} for sequence {} ({:?})",
        status, sequence_number, id
    );
    publisher
        .publish_failure(&FailureEvent {
            message: json!({ "id": id }),
            reason: status.to_string(),
        })
        .await?;
    Ok(())
}

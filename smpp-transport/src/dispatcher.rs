//! Outbound dispatch: queued message → submit_sm → persisted correlation

use crate::error::{Result, TransportError};
use crate::events::OutboundMessage;
use crate::metrics::{LAST_SEQUENCE, LOOKUP_MISSES_TOTAL, SUBMISSIONS_TOTAL};
use crate::session::{SequenceNumber, SubmitSm};
use crate::transport::SessionContext;
use bytes::Bytes;
use message_bus::Delivery;
use tracing::{debug, info, warn};

/// Submit `message` and record its correlation.
///
/// A failed submit_sm aborts the cycle without touching the store. On
/// success the counter is updated first, then the pending entry written.
pub async fn dispatch(
    ctx: &mut SessionContext,
    message: &OutboundMessage,
) -> Result<SequenceNumber> {
    let sequence_number = submit(ctx, message).await?;
    record(ctx, message, sequence_number).await?;
    Ok(sequence_number)
}

async fn submit(ctx: &mut SessionContext, message: &OutboundMessage) -> Result<SequenceNumber> {
    let source_addr = ctx
        .routing
        .resolve_source_addr(&message.to_msisdn, message.from_msisdn.as_deref());
    if ctx.routing.operator_number(&message.to_msisdn).is_none() {
        LOOKUP_MISSES_TOTAL.with_label_values(&["routing"]).inc();
        debug!(
            "No operator route for {}, using source {:?}",
            message.to_msisdn, source_addr
        );
    }

    let running = ctx.state.running_mut()?;
    let pdu = SubmitSm {
        source_addr,
        destination_addr: message.to_msisdn.clone(),
        short_message: Bytes::from(message.message.clone().into_bytes()),
    };

    match running.session.submit_sm(pdu).await {
        Ok(sequence_number) => {
            SUBMISSIONS_TOTAL.with_label_values(&["ok"]).inc();
            Ok(sequence_number)
        }
        Err(e) => {
            SUBMISSIONS_TOTAL.with_label_values(&["failed"]).inc();
            Err(TransportError::Submission(e))
        }
    }
}

async fn record(
    ctx: &mut SessionContext,
    message: &OutboundMessage,
    sequence_number: SequenceNumber,
) -> Result<()> {
    let running = ctx.state.running_mut()?;
    running.sequences.set_last_sequence(sequence_number).await?;
    LAST_SEQUENCE.set(i64::from(sequence_number));
    running
        .sequences
        .set_pending(sequence_number, &message.id)
        .await?;

    info!(
        "📨 Submitted {} to {} as sequence {}",
        message.id, message.to_msisdn, sequence_number
    );
    Ok(())
}

/// Dispatch one queued delivery and settle it.
///
/// Failures before the SMSC accepted the PDU nak the delivery so the fabric
/// redelivers it. Once submit_sm returned a sequence number the delivery is
/// acked, even if recording the correlation fails; that error is still
/// returned. Unusable payloads are rejected.
pub async fn handle_delivery(ctx: &mut SessionContext, delivery: Delivery) -> Result<()> {
    let message: OutboundMessage = match serde_json::from_value(delivery.message.payload.clone()) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejecting malformed outbound message {}", delivery.message.id);
            delivery.reject().await?;
            return Err(TransportError::MalformedMessage(e));
        }
    };

    let sequence_number = match submit(ctx, &message).await {
        Ok(sequence_number) => sequence_number,
        Err(e) => {
            if let Err(nak_error) = delivery.nak().await {
                warn!("Failed to nak {}: {}", message.id, nak_error);
            }
            return Err(e);
        }
    };

    let recorded = record(ctx, &message, sequence_number).await;
    if let Err(e) = &recorded {
        warn!(
            "{} submitted as sequence {} but not recorded: {}",
            message.id, sequence_number, e
        );
    }
    delivery.ack().await?;
    recorded
}

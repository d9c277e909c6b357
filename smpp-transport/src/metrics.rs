//! Prometheus metrics for the transport

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_gauge, CounterVec, IntGauge};

lazy_static! {
    /// submit_sm calls by outcome (ok/failed)
    pub static ref SUBMISSIONS_TOTAL: CounterVec = register_counter_vec!(
        "smpp_transport_submissions_total",
        "submit_sm calls by outcome",
        &["status"]
    )
    .unwrap();

    /// Session events handled, by kind
    pub static ref SESSION_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "smpp_transport_session_events_total",
        "Session events handled",
        &["event"]
    )
    .unwrap();

    /// Lookups that found nothing
    pub static ref LOOKUP_MISSES_TOTAL: CounterVec = register_counter_vec!(
        "smpp_transport_lookup_misses_total",
        "Correlation and routing lookups without a match",
        &["table"]
    )
    .unwrap();

    /// Handler invocations that failed, by error kind
    pub static ref HANDLER_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "smpp_transport_handler_failures_total",
        "Failed handler invocations",
        &["kind"]
    )
    .unwrap();

    /// Last persisted sequence number
    pub static ref LAST_SEQUENCE: IntGauge = register_int_gauge!(
        "smpp_transport_last_sequence_number",
        "Last persisted sequence number"
    )
    .unwrap();
}

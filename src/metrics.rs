//! Prometheus metrics for the ICM dashboard backend
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};

lazy_static! {
    // Send flow
    pub static ref MESSAGES_PREPARED: CounterVec = register_counter_vec!(
        "icm_messages_prepared_total",
        "Total number of transactions prepared for wallet signing",
        &["mode"]
    ).unwrap();

    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "icm_confirmations_total",
        "Completed transactions by confirmation outcome",
        &["outcome"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: Histogram = register_histogram!(
        "icm_confirmation_latency_seconds",
        "Time from completion request to receipt",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    // Delivery tracking
    pub static ref STATUS_CHECKS: CounterVec = register_counter_vec!(
        "icm_status_checks_total",
        "Message status checks by result",
        &["status"]
    ).unwrap();

    pub static ref STATUS_TRANSITIONS: CounterVec = register_counter_vec!(
        "icm_status_transitions_total",
        "Recorded messages moved out of pending",
        &["status"]
    ).unwrap();

    pub static ref PENDING_MESSAGES: Gauge = register_gauge!(
        "icm_pending_messages",
        "Pending messages seen by the last tracker pass"
    ).unwrap();

    // Errors
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "icm_errors_total",
        "Errors by component and kind",
        &["component", "kind"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "icm_up",
        "Whether the service is up (1) or down (0)"
    ).unwrap();
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

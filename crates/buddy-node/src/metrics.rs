//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use buddy_core::PresenceEvent;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const ROSTER_SIZE: &str = "buddy_roster_size";
    pub const INVITATIONS_PENDING: &str = "buddy_invitations_pending";
    pub const INVITATIONS_RECEIVED_TOTAL: &str = "buddy_invitations_received_total";
    pub const SESSIONS_TOTAL: &str = "buddy_sessions_total";
    pub const ALERTS_TOTAL: &str = "buddy_alerts_total";
    pub const PROTOCOL_VIOLATIONS_TOTAL: &str = "buddy_protocol_violations_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_gauge!(names::ROSTER_SIZE, "Current number of buddies on the roster");
    metrics::describe_gauge!(
        names::INVITATIONS_PENDING,
        "Current number of invitations in flight"
    );
    metrics::describe_counter!(
        names::INVITATIONS_RECEIVED_TOTAL,
        "Total number of invitations received"
    );
    metrics::describe_counter!(names::SESSIONS_TOTAL, "Total number of chat sessions started");
    metrics::describe_counter!(names::ALERTS_TOTAL, "Total number of user-visible errors");
    metrics::describe_counter!(
        names::PROTOCOL_VIOLATIONS_TOTAL,
        "Total number of invitation protocol violations"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a presence event.
pub fn record_event(event: &PresenceEvent) {
    match event {
        PresenceEvent::RosterChanged => {}
        PresenceEvent::InvitationReceived { .. } => {
            counter!(names::INVITATIONS_RECEIVED_TOTAL).increment(1);
        }
        PresenceEvent::SessionReady { role, .. } => {
            counter!(names::SESSIONS_TOTAL, "role" => format!("{:?}", role).to_lowercase())
                .increment(1);
        }
        PresenceEvent::Alert { .. } => {
            counter!(names::ALERTS_TOTAL).increment(1);
        }
        PresenceEvent::ProtocolViolation { .. } => {
            counter!(names::PROTOCOL_VIOLATIONS_TOTAL).increment(1);
        }
    }
}

/// Update roster gauges.
pub fn set_roster(size: usize, pending_invitations: usize) {
    gauge!(names::ROSTER_SIZE).set(size as f64);
    gauge!(names::INVITATIONS_PENDING).set(pending_invitations as f64);
}

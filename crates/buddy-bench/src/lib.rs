//! Shared fixtures for the buddy benchmarks.

use buddy_core::{BuddyList, PresenceConfig, PresenceController, PresenceEvent};
use buddy_protocol::Signal;
use buddy_transport::{ConnectionId, SignalSink, TransportError};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Sink that discards every signal.
#[derive(Debug, Default)]
pub struct NullSink;

impl SignalSink for NullSink {
    fn signal(&self, _signal: Signal) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Identifier of the `n`th benchmark buddy.
#[must_use]
pub fn peer_id(n: usize) -> String {
    format!("conn_{n}")
}

/// A roster of `size` idle buddies.
#[must_use]
pub fn roster(size: usize) -> BuddyList {
    let mut roster = BuddyList::new();
    for n in 0..size {
        roster.connect(&peer_id(n), format!("Buddy {n}"));
    }
    roster
}

/// A controller whose roster holds `size` idle buddies.
///
/// The returned receiver keeps the event channel open.
#[must_use]
pub fn controller(size: usize) -> (PresenceController, broadcast::Receiver<PresenceEvent>) {
    let (events, rx) = broadcast::channel(1024);
    let mut controller = PresenceController::new(
        ConnectionId::new("conn_local"),
        Arc::new(NullSink),
        events,
        PresenceConfig::default(),
    );
    for n in 0..size {
        controller.peer_connected(&peer_id(n), r#"{"name":"Buddy"}"#);
    }
    (controller, rx)
}

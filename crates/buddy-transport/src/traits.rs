//! Transport abstraction traits.
//!
//! These traits describe the signaling primitive buddies share: join a
//! session's channel, broadcast signals on it, and observe other connections
//! coming and going.

use async_trait::async_trait;
use buddy_protocol::{SessionInfo, Signal};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Atomic counter keeping generated IDs unique within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session to join does not exist or was torn down.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Failed to send a signal.
    #[error("Send failed: {0}")]
    SendFailed(String),


    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Something that happened on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A signal arrived. `from` is `None` for signals not sent by a connection.
    SignalReceived {
        signal: Signal,
        from: Option<ConnectionId>,
    },
    /// Another connection joined, carrying its metadata string.
    ConnectionCreated { id: ConnectionId, data: String },
    /// Another connection left.
    ConnectionDestroyed { id: ConnectionId },
}

/// Sending half of a connection.
///
/// Sends are fire-and-forget: success means the signal was handed to the
/// channel, not that anyone received it.
pub trait SignalSink: Send + Sync {
    /// Broadcast a signal to every connection in the session.
    fn signal(&self, signal: Signal) -> Result<(), TransportError>;
}

/// A transport that can join signaling sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join the channel of `session` using `token`, announcing `data` to the
    /// other connections.
    async fn connect(
        &self,
        session: &SessionInfo,
        token: &str,
        data: String,
    ) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name.
    fn name(&self) -> &'static str;
}

/// An active connection to a signaling session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Get a handle for sending signals on this connection.
    fn sink(&self) -> Arc<dyn SignalSink>;

    /// Receive the next event.
    ///
    /// Returns `None` once the connection is closed.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Leave the session.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

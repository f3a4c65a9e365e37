//! # buddy-transport
//!
//! Signaling transport abstraction for buddy presence.
//!
//! The presence controller only needs a shared, message-oriented channel:
//! broadcast a signal, hear other connections' signals, and learn when
//! connections join or leave. All transports implement the [`Transport`] and
//! [`Connection`] traits so the controller stays transport-agnostic.
//!
//! [`LocalHub`] is an in-process implementation used to run several buddies
//! inside one process.
//!
//! ```rust,ignore
//! use buddy_transport::{Connection, TransportEvent};
//!
//! async fn pump(mut conn: Box<dyn Connection>) {
//!     while let Some(event) = conn.recv().await {
//!         // Dispatch event
//!     }
//! }
//! ```

pub mod local;
pub mod traits;

pub use local::LocalHub;
pub use traits::{
    Connection, ConnectionId, SignalSink, Transport, TransportError, TransportEvent,
};

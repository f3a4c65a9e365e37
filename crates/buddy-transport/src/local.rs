//! In-process signaling hub.
//!
//! Every session id maps to a room. Signals sent on a connection are
//! delivered to every member of its room, the sender included, the way a
//! hosted signaling service echoes broadcast signals back to their origin.

use async_trait::async_trait;
use buddy_protocol::{SessionInfo, Signal};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{
    Connection, ConnectionId, SignalSink, Transport, TransportError, TransportEvent,
};

type Rooms = Arc<DashMap<String, Room>>;

struct Member {
    id: ConnectionId,
    data: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
struct Room {
    members: Vec<Member>,
}

/// A transport connecting buddies inside one process.
#[derive(Clone, Default)]
pub struct LocalHub {
    rooms: Rooms,
}

impl LocalHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections in a session.
    #[must_use]
    pub fn member_count(&self, session_id: &str) -> usize {
        self.rooms
            .get(session_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    /// Number of sessions with at least one connection.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.rooms.len()
    }

    /// Broadcast a signal that does not originate from any connection.
    ///
    /// Returns the number of connections it was delivered to.
    pub fn broadcast(&self, session_id: &str, signal: Signal) -> usize {
        deliver(&self.rooms, session_id, &signal, None)
    }
}

fn deliver(rooms: &Rooms, session_id: &str, signal: &Signal, from: Option<&ConnectionId>) -> usize {
    let Some(room) = rooms.get(session_id) else {
        return 0;
    };

    room.members
        .iter()
        .filter(|member| {
            member
                .tx
                .send(TransportEvent::SignalReceived {
                    signal: signal.clone(),
                    from: from.cloned(),
                })
                .is_ok()
        })
        .count()
}

fn leave(rooms: &Rooms, session_id: &str, id: &ConnectionId) {
    if let Some(mut room) = rooms.get_mut(session_id) {
        room.members.retain(|member| member.id != *id);
        for member in &room.members {
            let _ = member
                .tx
                .send(TransportEvent::ConnectionDestroyed { id: id.clone() });
        }
    }

    if rooms
        .remove_if(session_id, |_, room| room.members.is_empty())
        .is_some()
    {
        debug!(session = %session_id, "Deleted empty session");
    }

    debug!(session = %session_id, connection = %id, "Connection left");
}

#[async_trait]
impl Transport for LocalHub {
    async fn connect(
        &self,
        session: &SessionInfo,
        token: &str,
        data: String,
    ) -> Result<Box<dyn Connection>, TransportError> {
        if token.is_empty() {
            return Err(TransportError::Other("Missing connection token".into()));
        }

        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut room = self.rooms.entry(session.session_id.clone()).or_default();
            for member in &room.members {
                let _ = member.tx.send(TransportEvent::ConnectionCreated {
                    id: id.clone(),
                    data: data.clone(),
                });
                let _ = tx.send(TransportEvent::ConnectionCreated {
                    id: member.id.clone(),
                    data: member.data.clone(),
                });
            }
            room.members.push(Member {
                id: id.clone(),
                data,
                tx,
            });

            debug!(
                session = %session.session_id,
                connection = %id,
                members = room.members.len(),
                "Connection joined"
            );
        }

        let open = Arc::new(AtomicBool::new(true));
        let sink = Arc::new(LocalSink {
            id: id.clone(),
            session_id: session.session_id.clone(),
            rooms: Arc::clone(&self.rooms),
            open: Arc::clone(&open),
        });

        Ok(Box::new(LocalConnection {
            id,
            session_id: session.session_id.clone(),
            rooms: Arc::clone(&self.rooms),
            rx,
            sink,
            open,
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalSink {
    id: ConnectionId,
    session_id: String,
    rooms: Rooms,
    open: Arc<AtomicBool>,
}

impl SignalSink for LocalSink {
    fn signal(&self, signal: Signal) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if !self.rooms.contains_key(&self.session_id) {
            return Err(TransportError::SessionNotFound(self.session_id.clone()));
        }

        let recipients = deliver(&self.rooms, &self.session_id, &signal, Some(&self.id));
        trace!(connection = %self.id, kind = %signal.kind, recipients, "Signal sent");
        Ok(())
    }
}

/// A connection to a [`LocalHub`] session.
pub struct LocalConnection {
    id: ConnectionId,
    session_id: String,
    rooms: Rooms,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    sink: Arc<LocalSink>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for LocalConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn sink(&self) -> Arc<dyn SignalSink> {
        self.sink.clone()
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if !self.is_open() {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }
        leave(&self.rooms, &self.session_id, &self.id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            leave(&self.rooms, &self.session_id, &self.id);
        }
    }
}

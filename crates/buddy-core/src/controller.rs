//! Presence and invitation state machine.
//!
//! The controller owns the roster. It dispatches channel events and user
//! actions against it and sends the protocol replies those transitions call
//! for. It is synchronous; [`crate::runtime`] serializes everything that
//! reaches it and runs the session service calls it asks for.

use crate::event::{PresenceEvent, SessionRole};
use crate::roster::BuddyList;
use crate::service::{ChatGrant, ServiceError};
use crate::user::{PeerState, RemoteUser};
use buddy_protocol::{codec, ConnectionData, Message, ProtocolError, SessionInfo, Signal, Status};
use buddy_transport::{ConnectionId, SignalSink, TransportError, TransportEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Presence errors.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// A buddy accepted an invitation we hold no token for.
    #[error("Invitation accepted by {0} without a tracked token")]
    InvitationNotTracked(String),

    /// Session service error.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The presence runtime is no longer running.
    #[error("Presence runtime stopped")]
    Stopped,
}

/// What to do when a buddy breaks the invitation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Log it, publish [`PresenceEvent::ProtocolViolation`] and carry on.
    #[default]
    Report,
    /// Abort the process.
    Abort,
}

/// Presence configuration.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Name announced to other buddies.
    pub display_name: String,
    /// Protocol violation handling.
    pub violation_policy: ViolationPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            display_name: "buddy".to_string(),
            violation_policy: ViolationPolicy::Report,
            event_capacity: 256,
        }
    }
}

/// Outcome of selecting a buddy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Ask the session service for a chat with this buddy, then invite them.
    RequestChat(RemoteUser),
    /// Ask the session service to join this buddy's chat, then accept.
    JoinChat(RemoteUser),
    /// Our outgoing invitation was withdrawn.
    Cancelled,
    /// The buddy is busy.
    Unavailable,
    /// The buddy is not on the roster.
    Unknown,
    /// A chat request or join for this buddy is already in flight.
    Pending,
    /// Sending failed; the roster is unchanged.
    Failed,
}

/// The presence state machine.
pub struct PresenceController {
    local_id: ConnectionId,
    roster: BuddyList,
    status: Status,
    sink: Arc<dyn SignalSink>,
    events: broadcast::Sender<PresenceEvent>,
    config: PresenceConfig,
    /// Buddies with a session service call in flight.
    pending: HashSet<String>,
    /// Last chat each buddy accepted from us, to spot repeated acceptances.
    accepted: HashMap<String, SessionInfo>,
}

impl PresenceController {
    /// Create a controller for the local connection with an empty roster.
    #[must_use]
    pub fn new(
        local_id: ConnectionId,
        sink: Arc<dyn SignalSink>,
        events: broadcast::Sender<PresenceEvent>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            local_id,
            roster: BuddyList::new(),
            status: Status::Online,
            sink,
            events,
            config,
            pending: HashSet::new(),
            accepted: HashMap::new(),
        }
    }

    /// Check if a chat request or join for a buddy is in flight.
    #[must_use]
    pub fn is_pending(&self, identifier: &str) -> bool {
        self.pending.contains(identifier)
    }

    /// Get the local connection ID.
    #[must_use]
    pub fn local_id(&self) -> &ConnectionId {
        &self.local_id
    }

    /// Get the roster.
    #[must_use]
    pub fn roster(&self) -> &BuddyList {
        &self.roster
    }

    /// Get the local status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Subscribe to presence events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: PresenceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn send(&self, message: &Message) -> Result<(), PresenceError> {
        let signal = codec::encode(message)?;
        self.sink.signal(signal)?;
        trace!(peer = %message.identifier(), kind = %message.kind(), "Sent message");
        Ok(())
    }

    fn broadcast_status(&self) -> Result<(), PresenceError> {
        self.send(&Message::status(self.local_id.as_str(), self.status))
    }

    /// Report an error according to its kind.
    ///
    /// Protocol violations follow the configured [`ViolationPolicy`]; anything
    /// else becomes a user-visible alert.
    pub fn report(&self, err: PresenceError) {
        match err {
            PresenceError::InvitationNotTracked(peer) => {
                error!(peer = %peer, "Protocol violation: invitation accepted without a tracked token");
                if self.config.violation_policy == ViolationPolicy::Abort {
                    std::process::abort();
                }
                self.notify(PresenceEvent::ProtocolViolation { peer });
            }
            other => {
                warn!(error = %other, "Presence action failed");
                self.notify(PresenceEvent::Alert {
                    message: other.to_string(),
                });
            }
        }
    }

    /// Handle one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SignalReceived { signal, from } => {
                let from = from.as_ref().map(ConnectionId::as_str);
                if let Err(e) = self.receive_signal(&signal, from) {
                    self.report(e);
                }
            }
            TransportEvent::ConnectionCreated { id, data } => {
                self.peer_connected(id.as_str(), &data);
            }
            TransportEvent::ConnectionDestroyed { id } => {
                self.peer_disconnected(id.as_str());
            }
        }
    }

    /// A connection joined the channel.
    ///
    /// Connections without a display name in their metadata are ignored.
    /// Returns `true` if the buddy was added.
    pub fn peer_connected(&mut self, identifier: &str, data: &str) -> bool {
        let Some(data) = ConnectionData::from_json(data) else {
            debug!(peer = %identifier, "Ignoring connection without a name");
            return false;
        };

        debug!(peer = %identifier, name = %data.name, "Buddy connected");
        self.accepted.remove(identifier);
        self.roster.connect(identifier, data.name);
        self.notify(PresenceEvent::RosterChanged);

        if self.status != Status::Online {
            if let Err(e) = self.broadcast_status() {
                warn!(error = %e, "Failed to announce status to new buddy");
            }
        }
        true
    }

    /// A connection left the channel.
    pub fn peer_disconnected(&mut self, identifier: &str) -> bool {
        self.accepted.remove(identifier);
        let removed = self.roster.disconnect(identifier);
        if removed {
            debug!(peer = %identifier, "Buddy disconnected");
            self.notify(PresenceEvent::RosterChanged);
        }
        removed
    }

    /// Decode and dispatch a raw signal from `from`.
    ///
    /// Signals that are not messages for us are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the message breaks the invitation protocol.
    pub fn receive_signal(&mut self, signal: &Signal, from: Option<&str>) -> Result<(), PresenceError> {
        match codec::decode(signal, from, self.local_id.as_str()) {
            Some(message) => self.dispatch(message),
            None => Ok(()),
        }
    }

    /// Apply a message received from a buddy.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::InvitationNotTracked`] if a buddy accepts an
    /// invitation we never sent; the roster is left untouched.
    pub fn dispatch(&mut self, message: Message) -> Result<(), PresenceError> {
        debug!(peer = %message.identifier(), kind = %message.kind(), "Dispatching message");

        match message {
            Message::Status { identifier, status } => {
                if self.roster.update_status(&identifier, status) {
                    self.notify(PresenceEvent::RosterChanged);
                }
            }
            Message::Invitation {
                identifier,
                session,
            } => {
                if self.roster.received_invite(&identifier, session) {
                    self.notify(PresenceEvent::RosterChanged);
                    self.notify(PresenceEvent::InvitationReceived { peer: identifier });
                }
            }
            Message::AcceptInvitation {
                identifier,
                session,
            } => {
                let Some(token) = self
                    .roster
                    .token_for_invitation_sent_to(&identifier)
                    .map(str::to_owned)
                else {
                    if self.accepted.get(&identifier) == Some(&session) {
                        debug!(peer = %identifier, "Ignoring repeated acceptance");
                        return Ok(());
                    }
                    return Err(PresenceError::InvitationNotTracked(identifier));
                };

                if self.roster.clear_invite(&identifier) {
                    self.notify(PresenceEvent::RosterChanged);
                }
                self.accepted.insert(identifier.clone(), session.clone());
                self.present(identifier, SessionRole::Inviter, ChatGrant::new(session, token));
            }
            Message::CancelInvitation { identifier, .. }
            | Message::DeclineInvitation { identifier, .. } => {
                if self.roster.clear_invite(&identifier) {
                    self.notify(PresenceEvent::RosterChanged);
                }
            }
        }

        Ok(())
    }

    /// The user picked a buddy.
    ///
    /// Idle, online buddies get invited; a received invitation is accepted;
    /// an invitation we sent is withdrawn. The first two need the session
    /// service, so they are returned for the caller to run and complete with
    /// [`Self::chat_requested`] or [`Self::chat_joined`]. Until that
    /// completion arrives, further selections of the buddy are ignored.
    pub fn select(&mut self, identifier: &str) -> Selection {
        let Some(user) = self.roster.get(identifier) else {
            return Selection::Unknown;
        };
        if self.pending.contains(identifier) {
            debug!(peer = %identifier, "Selection ignored, chat call in flight");
            return Selection::Pending;
        }

        let session = match user.state() {
            PeerState::Idle if user.is_available() => {
                let user = user.clone();
                self.pending.insert(user.identifier.clone());
                return Selection::RequestChat(user);
            }
            PeerState::Idle => return Selection::Unavailable,
            PeerState::InvitationReceived { .. } => {
                let user = user.clone();
                self.pending.insert(user.identifier.clone());
                return Selection::JoinChat(user);
            }
            PeerState::InvitationSent { session, .. } => session.clone(),
        };

        if let Err(e) = self.send(&Message::cancel(identifier, session)) {
            self.report(e);
            return Selection::Failed;
        }

        debug!(peer = %identifier, "Invitation cancelled");
        if self.roster.clear_invite(identifier) {
            self.notify(PresenceEvent::RosterChanged);
        }
        Selection::Cancelled
    }

    /// Completion of a chat request for inviting `identifier`.
    pub fn chat_requested(&mut self, identifier: &str, result: Result<ChatGrant, ServiceError>) {
        self.pending.remove(identifier);
        let grant = match result {
            Ok(grant) => grant,
            Err(e) => return self.report(e.into()),
        };

        if let Err(e) = self.send(&Message::invitation(identifier, grant.session.clone())) {
            return self.report(e);
        }

        debug!(peer = %identifier, session = %grant.session.session_id, "Invitation sent");
        if self.roster.sent_invite(identifier, grant.session, grant.token) {
            self.notify(PresenceEvent::RosterChanged);
        }
    }

    /// Completion of joining the chat `identifier` invited us to.
    pub fn chat_joined(&mut self, identifier: &str, result: Result<ChatGrant, ServiceError>) {
        self.pending.remove(identifier);
        let grant = match result {
            Ok(grant) => grant,
            Err(e) => return self.report(e.into()),
        };

        if let Err(e) = self.send(&Message::accept(identifier, grant.session.clone())) {
            return self.report(e);
        }

        if self.roster.clear_invite(identifier) {
            self.notify(PresenceEvent::RosterChanged);
        }
        self.present(identifier.to_string(), SessionRole::Invitee, grant);
    }

    /// Turn down the invitation `identifier` sent us.
    ///
    /// Returns `true` if an invitation was declined. An invitation we are
    /// already joining cannot be declined.
    pub fn decline(&mut self, identifier: &str) -> bool {
        if self.pending.contains(identifier) {
            return false;
        }
        let session: Option<SessionInfo> = match self.roster.get(identifier).map(RemoteUser::state) {
            Some(PeerState::InvitationReceived { session }) => Some(session.clone()),
            _ => None,
        };
        let Some(session) = session else {
            return false;
        };

        if let Err(e) = self.send(&Message::decline(identifier, session)) {
            self.report(e);
            return false;
        }

        debug!(peer = %identifier, "Invitation declined");
        if self.roster.clear_invite(identifier) {
            self.notify(PresenceEvent::RosterChanged);
        }
        true
    }

    /// Change the local status and announce it.
    ///
    /// # Errors
    ///
    /// Returns an error if the status signal cannot be sent.
    pub fn set_status(&mut self, status: Status) -> Result<(), PresenceError> {
        self.status = status;
        self.broadcast_status()
    }

    /// The local user left the chat; become available again.
    ///
    /// # Errors
    ///
    /// Returns an error if the status signal cannot be sent.
    pub fn leave_session(&mut self) -> Result<(), PresenceError> {
        self.set_status(Status::Online)
    }

    fn present(&mut self, peer: String, role: SessionRole, grant: ChatGrant) {
        info!(
            peer = %peer,
            role = ?role,
            session = %grant.session.session_id,
            "Chat session ready"
        );

        if let Err(e) = self.set_status(Status::Busy) {
            warn!(error = %e, "Failed to announce busy status");
        }
        self.notify(PresenceEvent::SessionReady { peer, role, grant });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_protocol::MessageKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const LOCAL: &str = "local";

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Signal>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Signal> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl SignalSink for RecordingSink {
        fn signal(&self, signal: Signal) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("offline".into()));
            }
            self.sent.lock().unwrap().push(signal);
            Ok(())
        }
    }

    fn controller() -> (
        PresenceController,
        Arc<RecordingSink>,
        broadcast::Receiver<PresenceEvent>,
    ) {
        let sink = Arc::new(RecordingSink::default());
        let (events, rx) = broadcast::channel(64);
        let controller = PresenceController::new(
            ConnectionId::new(LOCAL),
            sink.clone(),
            events,
            PresenceConfig::default(),
        );
        (controller, sink, rx)
    }

    fn session(id: &str) -> SessionInfo {
        SessionInfo::new("key", id)
    }

    fn name(name: &str) -> String {
        ConnectionData::new(name).to_json().unwrap()
    }

    fn inbound(controller: &mut PresenceController, from: &str, message: Message) -> Result<(), PresenceError> {
        let signal = codec::encode(&message).unwrap();
        controller.receive_signal(&signal, Some(from))
    }

    fn drain(rx: &mut broadcast::Receiver<PresenceEvent>) -> Vec<PresenceEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_peer_connect_and_disconnect() {
        let (mut controller, _sink, mut rx) = controller();

        assert!(controller.peer_connected("p1", &name("Alice")));
        assert!(!controller.peer_connected("p2", r#"{"nick":"Bob"}"#));
        assert_eq!(controller.roster().len(), 1);

        assert!(controller.peer_disconnected("p1"));
        assert!(!controller.peer_disconnected("p1"));
        assert!(controller.roster().is_empty());

        assert_eq!(
            drain(&mut rx),
            [PresenceEvent::RosterChanged, PresenceEvent::RosterChanged]
        );
    }

    #[test]
    fn test_inbound_status() {
        let (mut controller, _sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));

        inbound(&mut controller, "p1", Message::status("p1", Status::Busy)).unwrap();
        assert_eq!(controller.roster().get("p1").unwrap().status, Status::Busy);

        // Unknown buddies are not created
        inbound(&mut controller, "p9", Message::status("p9", Status::Busy)).unwrap();
        assert_eq!(controller.roster().len(), 1);
    }

    #[test]
    fn test_self_originated_signal_is_ignored() {
        let (mut controller, _sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        drain(&mut rx);
        let before = controller.roster().clone();

        inbound(&mut controller, LOCAL, Message::status(LOCAL, Status::Busy)).unwrap();
        inbound(&mut controller, LOCAL, Message::invitation(LOCAL, session("s1"))).unwrap();

        assert_eq!(controller.roster(), &before);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_select_idle_buddy_requests_chat() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.peer_connected("p2", &name("Bob"));
        controller.roster.update_status("p2", Status::Busy);
        drain(&mut rx);

        let selection = controller.select("p1");
        assert!(matches!(selection, Selection::RequestChat(ref user) if user.identifier == "p1"));
        assert_eq!(controller.select("p2"), Selection::Unavailable);
        assert_eq!(controller.select("p9"), Selection::Unknown);
        assert!(sink.take().is_empty());

        controller.chat_requested("p1", Ok(ChatGrant::new(session("s1"), "tok1")));

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::invitation(LOCAL, session("s1")))
        );
        assert_eq!(controller.roster().token_for_invitation_sent_to("p1"), Some("tok1"));
        assert_eq!(drain(&mut rx), [PresenceEvent::RosterChanged]);
    }

    #[test]
    fn test_chat_request_failure_alerts() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        drain(&mut rx);
        let before = controller.roster().clone();

        controller.chat_requested("p1", Err(ServiceError::Unavailable));

        assert_eq!(controller.roster(), &before);
        assert!(sink.take().is_empty());
        assert!(matches!(drain(&mut rx).as_slice(), [PresenceEvent::Alert { .. }]));
    }

    #[test]
    fn test_accept_presents_remote_session() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.sent_invite("p1", session("s1"), "tok1");
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::accept(LOCAL, session("s1"))).unwrap();

        let user = controller.roster().get("p1").unwrap();
        assert!(user.invitation_session_info().is_none());
        assert!(user.invitation_token().is_none());
        assert_eq!(controller.status(), Status::Busy);

        assert_eq!(
            drain(&mut rx),
            [
                PresenceEvent::RosterChanged,
                PresenceEvent::SessionReady {
                    peer: "p1".into(),
                    role: SessionRole::Inviter,
                    grant: ChatGrant::new(session("s1"), "tok1"),
                }
            ]
        );

        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::status(LOCAL, Status::Busy))
        );
    }

    #[test]
    fn test_accept_without_token_is_violation() {
        let (mut controller, _sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.received_invite("p1", session("s1"));
        drain(&mut rx);
        let before = controller.roster().clone();

        let result = inbound(&mut controller, "p9", Message::accept(LOCAL, session("s9")));
        assert!(matches!(result, Err(PresenceError::InvitationNotTracked(ref p)) if p == "p9"));

        let result = inbound(&mut controller, "p1", Message::accept(LOCAL, session("s1")));
        assert!(matches!(result, Err(PresenceError::InvitationNotTracked(_))));

        assert_eq!(controller.roster(), &before);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_violation_is_reported_as_event() {
        let (mut controller, _sink, mut rx) = controller();
        let signal = codec::encode(&Message::accept(LOCAL, session("s9"))).unwrap();

        controller.handle_event(TransportEvent::SignalReceived {
            signal,
            from: Some(ConnectionId::new("p9")),
        });

        assert_eq!(
            drain(&mut rx),
            [PresenceEvent::ProtocolViolation { peer: "p9".into() }]
        );
    }

    #[test]
    fn test_received_invitation_then_join() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::invitation(LOCAL, session("s1"))).unwrap();
        assert_eq!(
            drain(&mut rx),
            [
                PresenceEvent::RosterChanged,
                PresenceEvent::InvitationReceived { peer: "p1".into() }
            ]
        );

        let selection = controller.select("p1");
        assert!(matches!(selection, Selection::JoinChat(ref user)
            if user.invitation_session_info() == Some(&session("s1"))));

        controller.chat_joined("p1", Ok(ChatGrant::new(session("s1"), "tok-join")));

        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::accept(LOCAL, session("s1")))
        );
        assert_eq!(controller.roster().get("p1").unwrap().state(), &PeerState::Idle);

        let events = drain(&mut rx);
        assert!(events.contains(&PresenceEvent::SessionReady {
            peer: "p1".into(),
            role: SessionRole::Invitee,
            grant: ChatGrant::new(session("s1"), "tok-join"),
        }));
    }

    #[test]
    fn test_select_sent_invitation_cancels() {
        let (mut controller, sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.sent_invite("p1", session("s1"), "tok1");

        assert_eq!(controller.select("p1"), Selection::Cancelled);

        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::cancel(LOCAL, session("s1")))
        );
        assert_eq!(controller.roster().get("p1").unwrap().state(), &PeerState::Idle);
    }

    #[test]
    fn test_failed_cancel_leaves_roster() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.sent_invite("p1", session("s1"), "tok1");
        drain(&mut rx);
        sink.fail.store(true, Ordering::SeqCst);

        assert_eq!(controller.select("p1"), Selection::Failed);
        assert_eq!(controller.roster().token_for_invitation_sent_to("p1"), Some("tok1"));
        assert!(matches!(drain(&mut rx).as_slice(), [PresenceEvent::Alert { .. }]));
    }

    #[test]
    fn test_decline() {
        let (mut controller, sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        assert!(!controller.decline("p1"));

        controller.roster.received_invite("p1", session("s1"));
        assert!(controller.decline("p1"));

        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::decline(LOCAL, session("s1")))
        );
        assert!(!controller.roster().has_invitations());
    }

    #[test]
    fn test_cancel_and_decline_from_buddy_clear_invitation() {
        let (mut controller, _sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.peer_connected("p2", &name("Bob"));
        controller.roster.received_invite("p1", session("s1"));
        controller.roster.sent_invite("p2", session("s2"), "tok2");

        inbound(&mut controller, "p1", Message::cancel(LOCAL, session("s1"))).unwrap();
        inbound(&mut controller, "p2", Message::decline(LOCAL, session("s2"))).unwrap();

        assert!(!controller.roster().has_invitations());
    }

    #[test]
    fn test_cross_invitation_keeps_outgoing_token() {
        let (mut controller, _sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.chat_requested("p1", Ok(ChatGrant::new(session("mine"), "tok1")));

        inbound(&mut controller, "p1", Message::invitation(LOCAL, session("theirs"))).unwrap();
        assert_eq!(controller.roster().token_for_invitation_sent_to("p1"), Some("tok1"));

        // Their acceptance of our invitation still resolves
        inbound(&mut controller, "p1", Message::accept(LOCAL, session("mine"))).unwrap();
        assert!(!controller.roster().has_invitations());
    }

    #[test]
    fn test_repeated_invitation_is_joined_once() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::invitation(LOCAL, session("s1"))).unwrap();
        inbound(&mut controller, "p1", Message::invitation(LOCAL, session("s1"))).unwrap();
        assert_eq!(
            drain(&mut rx),
            [
                PresenceEvent::RosterChanged,
                PresenceEvent::InvitationReceived { peer: "p1".into() }
            ]
        );

        assert!(matches!(controller.select("p1"), Selection::JoinChat(_)));
        assert_eq!(controller.select("p1"), Selection::Pending);
        assert!(!controller.decline("p1"));
        assert!(controller.is_pending("p1"));

        controller.chat_joined("p1", Ok(ChatGrant::new(session("s1"), "tok-join")));
        assert!(!controller.is_pending("p1"));

        let accepts = sink
            .take()
            .iter()
            .filter(|s| s.kind == MessageKind::AcceptInvitation.as_str())
            .count();
        assert_eq!(accepts, 1);
    }

    #[test]
    fn test_repeated_select_requests_one_chat() {
        let (mut controller, sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));

        assert!(matches!(controller.select("p1"), Selection::RequestChat(_)));
        assert_eq!(controller.select("p1"), Selection::Pending);

        controller.chat_requested("p1", Ok(ChatGrant::new(session("s1"), "tok1")));
        assert_eq!(sink.take().len(), 1);

        // Once the invitation is out, selecting again withdraws it
        assert_eq!(controller.select("p1"), Selection::Cancelled);
    }

    #[test]
    fn test_failed_request_allows_retry() {
        let (mut controller, _sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));

        assert!(matches!(controller.select("p1"), Selection::RequestChat(_)));
        controller.chat_requested("p1", Err(ServiceError::Unavailable));

        assert!(matches!(controller.select("p1"), Selection::RequestChat(_)));
    }

    #[test]
    fn test_repeated_acceptance_is_ignored() {
        let (mut controller, _sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.sent_invite("p1", session("s1"), "tok1");
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::accept(LOCAL, session("s1"))).unwrap();
        inbound(&mut controller, "p1", Message::accept(LOCAL, session("s1"))).unwrap();

        let ready = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, PresenceEvent::SessionReady { .. }))
            .count();
        assert_eq!(ready, 1);

        // A different session was never offered
        let result = inbound(&mut controller, "p1", Message::accept(LOCAL, session("s2")));
        assert!(matches!(result, Err(PresenceError::InvitationNotTracked(_))));
    }

    #[test]
    fn test_duplicate_and_stale_signals_are_silent() {
        let (mut controller, _sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::status("p1", Status::Online)).unwrap();
        inbound(&mut controller, "p1", Message::cancel(LOCAL, session("s1"))).unwrap();
        assert!(drain(&mut rx).is_empty());

        // Their decline crosses our cancel
        controller.roster.sent_invite("p1", session("s1"), "tok1");
        assert_eq!(controller.select("p1"), Selection::Cancelled);
        drain(&mut rx);

        inbound(&mut controller, "p1", Message::decline(LOCAL, session("s1"))).unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.roster().get("p1").unwrap().state(), &PeerState::Idle);
    }

    #[test]
    fn test_failed_decline_keeps_invitation() {
        let (mut controller, sink, mut rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.roster.received_invite("p1", session("s1"));
        drain(&mut rx);
        sink.fail.store(true, Ordering::SeqCst);

        assert!(!controller.decline("p1"));
        assert_eq!(
            controller.roster().get("p1").unwrap().invitation_session_info(),
            Some(&session("s1"))
        );
        assert!(matches!(drain(&mut rx).as_slice(), [PresenceEvent::Alert { .. }]));
    }

    #[test]
    fn test_cancel_after_cross_invitation_carries_their_session() {
        let (mut controller, sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        controller.chat_requested("p1", Ok(ChatGrant::new(session("mine"), "tok1")));
        inbound(&mut controller, "p1", Message::invitation(LOCAL, session("theirs"))).unwrap();
        sink.take();

        assert_eq!(controller.select("p1"), Selection::Cancelled);

        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p1"),
            Some(Message::cancel(LOCAL, session("theirs")))
        );
    }

    #[test]
    fn test_status_announced_to_new_buddy_when_busy() {
        let (mut controller, sink, _rx) = controller();
        controller.peer_connected("p1", &name("Alice"));
        assert!(sink.take().is_empty());

        controller.set_status(Status::Busy).unwrap();
        sink.take();

        controller.peer_connected("p2", &name("Bob"));
        let sent = sink.take();
        assert_eq!(
            codec::decode(&sent[0], Some(LOCAL), "p2"),
            Some(Message::status(LOCAL, Status::Busy))
        );

        controller.leave_session().unwrap();
        assert_eq!(controller.status(), Status::Online);
    }
}

//! Notifications published to the presentation layer.

use crate::service::ChatGrant;

/// Which side of the handshake we were on when a chat started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// We sent the invitation and the buddy accepted.
    Inviter,
    /// We accepted the buddy's invitation.
    Invitee,
}

/// Presence notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The roster changed; re-read it.
    RosterChanged,
    /// A buddy invited us.
    InvitationReceived { peer: String },
    /// A chat with `peer` is ready to be shown.
    SessionReady {
        peer: String,
        role: SessionRole,
        grant: ChatGrant,
    },
    /// A user-visible error.
    Alert { message: String },
    /// A buddy broke the invitation protocol.
    ProtocolViolation { peer: String },
}

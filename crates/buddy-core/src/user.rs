//! Remote buddies and their invitation state.

use buddy_protocol::{SessionInfo, Status};
use serde::{Deserialize, Serialize};

/// Invitation state of a buddy, from the local point of view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PeerState {
    /// No invitation in flight.
    #[default]
    Idle,
    /// The buddy invited us and we have not answered.
    InvitationReceived { session: SessionInfo },
    /// We invited the buddy. `token` joins `session` once they accept.
    InvitationSent { session: SessionInfo, token: String },
}

impl PeerState {
    /// Session descriptor of the pending invitation.
    #[must_use]
    pub fn session(&self) -> Option<&SessionInfo> {
        match self {
            PeerState::Idle => None,
            PeerState::InvitationReceived { session }
            | PeerState::InvitationSent { session, .. } => Some(session),
        }
    }

    /// Token of an invitation we sent.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            PeerState::InvitationSent { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Check if an invitation is in flight in either direction.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !matches!(self, PeerState::Idle)
    }
}

/// A buddy on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Connection identifier, unique within a roster.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Availability.
    pub status: Status,
    /// Invitation state.
    #[serde(flatten)]
    pub state: PeerState,
}

impl RemoteUser {
    /// Create an online buddy with no invitation in flight.
    #[must_use]
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            status: Status::Online,
            state: PeerState::Idle,
        }
    }

    /// Get the invitation state.
    #[must_use]
    pub fn state(&self) -> &PeerState {
        &self.state
    }

    /// Session descriptor of a pending invitation, sent or received.
    #[must_use]
    pub fn invitation_session_info(&self) -> Option<&SessionInfo> {
        self.state.session()
    }

    /// Token of an invitation we sent to this buddy.
    #[must_use]
    pub fn invitation_token(&self) -> Option<&str> {
        self.state.token()
    }

    /// Check if the buddy can be invited right now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == Status::Online && !self.state.is_pending()
    }
}

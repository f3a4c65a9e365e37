//! The buddy roster.
//!
//! Buddies are kept in connection order and looked up by identifier with a
//! linear scan; rosters are small. Every mutator is a keyed upsert or delete
//! and silently does nothing when the identifier is not on the roster. The
//! `bool` they return is `true` only when the roster actually changed.

use buddy_protocol::{SessionInfo, Status};
use serde::Serialize;
use tracing::trace;

use crate::user::{PeerState, RemoteUser};

/// Ordered set of buddies keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuddyList {
    users: Vec<RemoteUser>,
}

impl BuddyList {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.users.iter().position(|u| u.identifier == identifier)
    }

    fn get_mut(&mut self, identifier: &str) -> Option<&mut RemoteUser> {
        self.users.iter_mut().find(|u| u.identifier == identifier)
    }

    /// All buddies in connection order.
    #[must_use]
    pub fn users(&self) -> &[RemoteUser] {
        &self.users
    }

    /// Get a buddy by identifier.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&RemoteUser> {
        self.users.iter().find(|u| u.identifier == identifier)
    }

    /// Check if a buddy is on the roster.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.position(identifier).is_some()
    }

    /// Number of buddies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Buddies with an invitation in flight, sent or received.
    #[must_use]
    pub fn invitations(&self) -> Vec<&RemoteUser> {
        self.users
            .iter()
            .filter(|u| u.invitation_session_info().is_some())
            .collect()
    }

    /// Check if any invitation is in flight.
    #[must_use]
    pub fn has_invitations(&self) -> bool {
        self.users
            .iter()
            .any(|u| u.invitation_session_info().is_some())
    }

    /// Token of the invitation we sent to a buddy, if any.
    #[must_use]
    pub fn token_for_invitation_sent_to(&self, identifier: &str) -> Option<&str> {
        self.get(identifier).and_then(RemoteUser::invitation_token)
    }

    /// Add a buddy, or reset an existing one in place.
    ///
    /// A reconnecting buddy comes back online with no invitation state.
    pub fn connect(&mut self, identifier: &str, name: impl Into<String>) {
        let user = RemoteUser::new(identifier, name);
        match self.position(identifier) {
            Some(index) => self.users[index] = user,
            None => self.users.push(user),
        }
        trace!(peer = %identifier, count = self.users.len(), "Roster: connect");
    }

    /// Remove a buddy.
    ///
    /// Returns `true` if the buddy was on the roster.
    pub fn disconnect(&mut self, identifier: &str) -> bool {
        match self.position(identifier) {
            Some(index) => {
                self.users.remove(index);
                trace!(peer = %identifier, count = self.users.len(), "Roster: disconnect");
                true
            }
            None => false,
        }
    }

    /// Update a buddy's status.
    ///
    /// Returns `true` if the status changed.
    pub fn update_status(&mut self, identifier: &str, status: Status) -> bool {
        match self.get_mut(identifier) {
            Some(user) if user.status != status => {
                user.status = status;
                true
            }
            _ => false,
        }
    }

    /// Record an invitation from a buddy.
    ///
    /// The session descriptor is replaced. An invitation we sent to the same
    /// buddy keeps its token, so it stays an outgoing invitation, now carrying
    /// the buddy's descriptor; cancelling it sends that descriptor back.
    ///
    /// Returns `true` if the descriptor changed.
    pub fn received_invite(&mut self, identifier: &str, session: SessionInfo) -> bool {
        let Some(user) = self.get_mut(identifier) else {
            return false;
        };
        if user.state.session() == Some(&session) {
            return false;
        }

        match &mut user.state {
            PeerState::InvitationSent {
                session: current, ..
            } => *current = session,
            state => *state = PeerState::InvitationReceived { session },
        }
        true
    }

    /// Record an invitation we sent to a buddy.
    ///
    /// Returns `true` if the invitation state changed.
    pub fn sent_invite(&mut self, identifier: &str, session: SessionInfo, token: impl Into<String>) -> bool {
        let Some(user) = self.get_mut(identifier) else {
            return false;
        };
        let state = PeerState::InvitationSent {
            session,
            token: token.into(),
        };
        if user.state == state {
            return false;
        }
        user.state = state;
        true
    }

    /// Forget any invitation with a buddy.
    ///
    /// Returns `true` if an invitation was pending.
    pub fn clear_invite(&mut self, identifier: &str) -> bool {
        match self.get_mut(identifier) {
            Some(user) if user.state.is_pending() => {
                user.state = PeerState::Idle;
                true
            }
            _ => false,
        }
    }
}

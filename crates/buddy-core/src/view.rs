//! Display rows for a roster list.

use crate::roster::BuddyList;
use crate::user::{PeerState, RemoteUser};

/// Placeholder shown when nobody is idle on the roster.
pub const EMPTY_ROSTER_TEXT: &str = "No buddies online";

/// One displayable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    /// Placeholder text.
    Empty(&'static str),
    /// An idle buddy.
    User(RemoteUser),
    /// A buddy with an invitation in flight. `initiated` is true when we sent it.
    Invite { user: RemoteUser, initiated: bool },
}

impl Row {
    /// Primary text for the row.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Row::Empty(text) => (*text).to_string(),
            Row::User(user) => user.name.clone(),
            Row::Invite {
                user,
                initiated: true,
            } => format!("Waiting for {}", user.name),
            Row::Invite {
                user,
                initiated: false,
            } => format!("Invitation from {}", user.name),
        }
    }

    /// Secondary text for the row.
    #[must_use]
    pub fn detail(&self) -> Option<&'static str> {
        match self {
            Row::User(user) => Some(user.status.display_status()),
            _ => None,
        }
    }

    /// Identifier of the buddy behind the row.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Row::Empty(_) => None,
            Row::User(user) | Row::Invite { user, .. } => Some(&user.identifier),
        }
    }
}

/// A titled group of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: &'static str,
    pub rows: Vec<Row>,
}

/// Lay the roster out as sections: pending invitations first (only when
/// there are any), then idle buddies.
#[must_use]
pub fn sections(roster: &BuddyList) -> Vec<Section> {
    let mut sections = Vec::with_capacity(2);

    if roster.has_invitations() {
        let rows = roster
            .invitations()
            .into_iter()
            .map(|user| Row::Invite {
                user: user.clone(),
                initiated: matches!(user.state(), PeerState::InvitationSent { .. }),
            })
            .collect();
        sections.push(Section {
            title: "Invitations",
            rows,
        });
    }

    let mut rows: Vec<Row> = roster
        .users()
        .iter()
        .filter(|user| !user.state().is_pending())
        .cloned()
        .map(Row::User)
        .collect();
    if rows.is_empty() {
        rows.push(Row::Empty(EMPTY_ROSTER_TEXT));
    }
    sections.push(Section {
        title: "Buddies",
        rows,
    });

    sections
}

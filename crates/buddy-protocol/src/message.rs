//! Message types exchanged between buddies.
//!
//! Every application-level intent travels as a [`Message`]. The codec turns
//! messages into signals (a kind string plus a JSON body) and back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A joinable chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// API key of the project owning the session.
    pub api_key: String,
    /// Session identifier.
    pub session_id: String,
}

impl SessionInfo {
    /// Create a new session descriptor.
    #[must_use]
    pub fn new(api_key: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_id: session_id.into(),
        }
    }
}

/// Availability of a buddy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Available for a chat.
    #[default]
    Online,
    /// Already in a chat.
    Busy,
}

impl Status {
    /// Human readable status, as shown next to a buddy's name.
    #[must_use]
    pub fn display_status(&self) -> &'static str {
        match self {
            Status::Online => "Online",
            Status::Busy => "Busy",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_status())
    }
}

impl std::str::FromStr for Status {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Status::Online),
            "busy" => Ok(Status::Busy),
            _ => Err("Invalid status"),
        }
    }
}

/// Signal kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Status,
    Invitation,
    AcceptInvitation,
    CancelInvitation,
    DeclineInvitation,
}

impl MessageKind {
    /// All kinds, in wire order.
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Status,
        MessageKind::Invitation,
        MessageKind::AcceptInvitation,
        MessageKind::CancelInvitation,
        MessageKind::DeclineInvitation,
    ];

    /// The signal type string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::Invitation => "invitation",
            MessageKind::AcceptInvitation => "acceptInvitation",
            MessageKind::CancelInvitation => "cancelInvitation",
            MessageKind::DeclineInvitation => "declineInvitation",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageKind {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "status" => Ok(MessageKind::Status),
            "invitation" => Ok(MessageKind::Invitation),
            "acceptInvitation" => Ok(MessageKind::AcceptInvitation),
            "cancelInvitation" => Ok(MessageKind::CancelInvitation),
            "declineInvitation" => Ok(MessageKind::DeclineInvitation),
            _ => Err("Invalid message kind"),
        }
    }
}

/// An application-level intent.
///
/// `identifier` names the peer on the other end: the recipient of an outbound
/// message, or the sender of a decoded one. Outbound `Status` messages are
/// broadcast, so their identifier is not encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Availability update.
    Status { identifier: String, status: Status },
    /// Invitation to join a chat session.
    Invitation {
        identifier: String,
        session: SessionInfo,
    },
    /// The invitee joined the session.
    AcceptInvitation {
        identifier: String,
        session: SessionInfo,
    },
    /// The inviter withdrew the invitation.
    CancelInvitation {
        identifier: String,
        session: SessionInfo,
    },
    /// The invitee turned the invitation down.
    DeclineInvitation {
        identifier: String,
        session: SessionInfo,
    },
}

impl Message {
    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Status { .. } => MessageKind::Status,
            Message::Invitation { .. } => MessageKind::Invitation,
            Message::AcceptInvitation { .. } => MessageKind::AcceptInvitation,
            Message::CancelInvitation { .. } => MessageKind::CancelInvitation,
            Message::DeclineInvitation { .. } => MessageKind::DeclineInvitation,
        }
    }

    /// Identifier of the remote peer.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Message::Status { identifier, .. }
            | Message::Invitation { identifier, .. }
            | Message::AcceptInvitation { identifier, .. }
            | Message::CancelInvitation { identifier, .. }
            | Message::DeclineInvitation { identifier, .. } => identifier,
        }
    }

    /// Session descriptor, for every kind but `Status`.
    #[must_use]
    pub fn session(&self) -> Option<&SessionInfo> {
        match self {
            Message::Status { .. } => None,
            Message::Invitation { session, .. }
            | Message::AcceptInvitation { session, .. }
            | Message::CancelInvitation { session, .. }
            | Message::DeclineInvitation { session, .. } => Some(session),
        }
    }

    /// Create a Status message.
    #[must_use]
    pub fn status(identifier: impl Into<String>, status: Status) -> Self {
        Message::Status {
            identifier: identifier.into(),
            status,
        }
    }

    /// Create an Invitation message.
    #[must_use]
    pub fn invitation(identifier: impl Into<String>, session: SessionInfo) -> Self {
        Message::Invitation {
            identifier: identifier.into(),
            session,
        }
    }

    /// Create an AcceptInvitation message.
    #[must_use]
    pub fn accept(identifier: impl Into<String>, session: SessionInfo) -> Self {
        Message::AcceptInvitation {
            identifier: identifier.into(),
            session,
        }
    }

    /// Create a CancelInvitation message.
    #[must_use]
    pub fn cancel(identifier: impl Into<String>, session: SessionInfo) -> Self {
        Message::CancelInvitation {
            identifier: identifier.into(),
            session,
        }
    }

    /// Create a DeclineInvitation message.
    #[must_use]
    pub fn decline(identifier: impl Into<String>, session: SessionInfo) -> Self {
        Message::DeclineInvitation {
            identifier: identifier.into(),
            session,
        }
    }
}

/// Metadata a buddy attaches to its channel connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// Display name.
    pub name: String,
}

impl ConnectionData {
    /// Create connection metadata for a display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Serialize to the JSON string carried by the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse connection metadata, returning `None` when the `name` key is missing.
    #[must_use]
    pub fn from_json(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

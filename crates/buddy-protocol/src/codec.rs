//! Codec for mapping messages onto signals.
//!
//! A signal is a pair of strings: the kind (one of the five message kind
//! names) and a JSON body. Invitation-kind bodies name their recipient so a
//! buddy can ignore invitations addressed to someone else on the shared
//! channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::message::{Message, MessageKind, SessionInfo, Status};

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Signal kind is not one of the known message kinds.
    #[error("Unknown signal kind: {0}")]
    UnknownKind(String),

    /// Body could not be parsed for its kind.
    #[error("Malformed {kind} body: {reason}")]
    Malformed { kind: MessageKind, reason: String },

    /// Signal has no sending connection.
    #[error("Signal has no sender")]
    NoSender,

    /// Signal was sent by the local connection.
    #[error("Signal originated from the local connection")]
    Echo,

    /// Signal is addressed to another connection.
    #[error("Signal addressed to {0}")]
    Misaddressed(String),
}

/// A raw signal as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Signal type.
    pub kind: String,
    /// Signal body.
    pub body: String,
}

impl Signal {
    /// Create a new signal.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StatusBody {
    status: Status,
}

#[derive(Serialize, Deserialize)]
struct InvitationBody {
    to: String,
    #[serde(flatten)]
    session: SessionInfo,
}

/// Encode a message into a signal.
///
/// # Errors
///
/// Returns an error if the body cannot be serialized.
pub fn encode(message: &Message) -> Result<Signal, ProtocolError> {
    let body = match message {
        Message::Status { status, .. } => serde_json::to_string(&StatusBody { status: *status })?,
        Message::Invitation {
            identifier,
            session,
        }
        | Message::AcceptInvitation {
            identifier,
            session,
        }
        | Message::CancelInvitation {
            identifier,
            session,
        }
        | Message::DeclineInvitation {
            identifier,
            session,
        } => serde_json::to_string(&InvitationBody {
            to: identifier.clone(),
            session: session.clone(),
        })?,
    };

    Ok(Signal::new(message.kind().as_str(), body))
}

/// Decode a signal received from `sender`, as seen by the `local` connection.
///
/// The decoded message's identifier is the sender's connection id.
///
/// # Errors
///
/// Returns an error describing why the signal is not a message for us.
pub fn try_decode(
    signal: &Signal,
    sender: Option<&str>,
    local: &str,
) -> Result<Message, ProtocolError> {
    let sender = sender.ok_or(ProtocolError::NoSender)?;
    if sender == local {
        return Err(ProtocolError::Echo);
    }

    let kind = MessageKind::try_from(signal.kind.as_str())
        .map_err(|_| ProtocolError::UnknownKind(signal.kind.clone()))?;
    let malformed = |e: serde_json::Error| ProtocolError::Malformed {
        kind,
        reason: e.to_string(),
    };

    if kind == MessageKind::Status {
        let body: StatusBody = serde_json::from_str(&signal.body).map_err(malformed)?;
        return Ok(Message::status(sender, body.status));
    }

    let body: InvitationBody = serde_json::from_str(&signal.body).map_err(malformed)?;
    if body.to != local {
        return Err(ProtocolError::Misaddressed(body.to));
    }

    let identifier = sender.to_string();
    let session = body.session;
    Ok(match kind {
        MessageKind::Invitation => Message::Invitation {
            identifier,
            session,
        },
        MessageKind::AcceptInvitation => Message::AcceptInvitation {
            identifier,
            session,
        },
        MessageKind::CancelInvitation => Message::CancelInvitation {
            identifier,
            session,
        },
        MessageKind::DeclineInvitation => Message::DeclineInvitation {
            identifier,
            session,
        },
        MessageKind::Status => unreachable!("status handled above"),
    })
}

/// Decode a signal, returning `None` for anything that is not a message for
/// the local connection. Callers ignore `None` silently.
#[must_use]
pub fn decode(signal: &Signal, sender: Option<&str>, local: &str) -> Option<Message> {
    match try_decode(signal, sender, local) {
        Ok(message) => Some(message),
        Err(e) => {
            trace!(kind = %signal.kind, sender = ?sender, reason = %e, "Dropping signal");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionInfo {
        SessionInfo::new("key-1", "sess-1")
    }

    #[test]
    fn test_invitation_body_names_recipient() {
        let signal = encode(&Message::invitation("bob", session())).unwrap();
        assert_eq!(signal.kind, "invitation");

        let body: serde_json::Value = serde_json::from_str(&signal.body).unwrap();
        assert_eq!(body["to"], "bob");
        assert_eq!(body["apiKey"], "key-1");
        assert_eq!(body["sessionId"], "sess-1");
    }

    #[test]
    fn test_decode_uses_sender_identifier() {
        let signal = encode(&Message::accept("bob", session())).unwrap();
        let decoded = decode(&signal, Some("alice"), "bob").unwrap();
        assert_eq!(decoded, Message::accept("alice", session()));

        let status = encode(&Message::status("ignored", Status::Busy)).unwrap();
        assert_eq!(status.body, r#"{"status":"busy"}"#);
        let decoded = decode(&status, Some("alice"), "bob").unwrap();
        assert_eq!(decoded, Message::status("alice", Status::Busy));
    }

    #[test]
    fn test_decode_ignores_echo() {
        let signal = encode(&Message::status("me", Status::Online)).unwrap();
        assert!(decode(&signal, Some("me"), "me").is_none());
        assert!(matches!(
            try_decode(&signal, Some("me"), "me"),
            Err(ProtocolError::Echo)
        ));
    }

    #[test]
    fn test_decode_ignores_missing_sender() {
        let signal = encode(&Message::status("me", Status::Online)).unwrap();
        assert!(matches!(
            try_decode(&signal, None, "me"),
            Err(ProtocolError::NoSender)
        ));
    }

    #[test]
    fn test_decode_ignores_misaddressed() {
        let signal = encode(&Message::invitation("carol", session())).unwrap();
        assert!(decode(&signal, Some("alice"), "bob").is_none());
        assert!(matches!(
            try_decode(&signal, Some("alice"), "bob"),
            Err(ProtocolError::Misaddressed(to)) if to == "carol"
        ));
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        let unknown = Signal::new("chat", "{}");
        assert!(matches!(
            try_decode(&unknown, Some("a"), "b"),
            Err(ProtocolError::UnknownKind(_))
        ));

        let malformed = Signal::new("invitation", r#"{"to":"b"}"#);
        assert!(matches!(
            try_decode(&malformed, Some("a"), "b"),
            Err(ProtocolError::Malformed {
                kind: MessageKind::Invitation,
                ..
            })
        ));

        let bad_status = Signal::new("status", r#"{"status":"away"}"#);
        assert!(decode(&bad_status, Some("a"), "b").is_none());
        assert!(decode(&Signal::new("status", "garbage"), Some("a"), "b").is_none());
    }
}

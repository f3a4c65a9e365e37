//! # buddy-protocol
//!
//! Signal definitions for buddy presence and chat invitations.
//!
//! Buddies talk to each other only through signals: a kind string plus a
//! string body, broadcast on a shared channel. This crate defines the
//! application-level [`Message`] carried by those signals and the codec that
//! maps one onto the other.
//!
//! ## Message Kinds
//!
//! - `status` - Availability broadcast
//! - `invitation` - Invite a buddy into a chat session
//! - `acceptInvitation` / `declineInvitation` - Invitee's answer
//! - `cancelInvitation` - Inviter withdraws
//!
//! ## Example
//!
//! ```rust
//! use buddy_protocol::{codec, Message, SessionInfo};
//!
//! let session = SessionInfo::new("api-key", "session-1");
//! let signal = codec::encode(&Message::invitation("bob", session)).unwrap();
//!
//! // Bob decodes it; the identifier becomes the sender's connection id.
//! let message = codec::decode(&signal, Some("alice"), "bob").unwrap();
//! assert_eq!(message.identifier(), "alice");
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, ProtocolError, Signal};
pub use message::{ConnectionData, Message, MessageKind, SessionInfo, Status};

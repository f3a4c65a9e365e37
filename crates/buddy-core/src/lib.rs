//! # buddy-core
//!
//! Buddy roster and the presence/invitation state machine.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **RemoteUser** - A buddy and its explicit invitation state
//! - **BuddyList** - The roster, keyed by connection identifier
//! - **PresenceController** - Dispatches channel events and user actions
//! - **Runtime** - Serializes everything onto one task that owns the roster
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Transport  │────▶│   Runtime    │────▶│ Controller  │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            ▲                    │
//!                            │                    ▼
//!                     ┌──────────────┐     ┌─────────────┐
//!                     │   Session    │     │  BuddyList  │
//!                     │   Service    │     └─────────────┘
//!                     └──────────────┘
//! ```
//!
//! Per buddy, invitations move through:
//!
//! ```text
//! Idle ──invite──▶ InvitationSent ──cancel──▶ Idle
//!                                 ──accepted─▶ chat (inviter)
//! Idle ◀─decline/cancel── InvitationReceived ──accept──▶ chat (invitee)
//! ```

pub mod controller;
pub mod event;
pub mod roster;
pub mod runtime;
pub mod service;
pub mod user;
pub mod view;

pub use controller::{PresenceConfig, PresenceController, PresenceError, Selection, ViolationPolicy};
pub use event::{PresenceEvent, SessionRole};
pub use roster::BuddyList;
pub use runtime::{start, PresenceHandle};
pub use service::{ChatGrant, ServiceError, SessionService};
pub use user::{PeerState, RemoteUser};
pub use view::{Row, Section};

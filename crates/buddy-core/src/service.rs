//! Session registration service.
//!
//! The service hands out the presence session every buddy joins, the token a
//! device connects with, and the chat sessions invitations point at.

use async_trait::async_trait;
use buddy_protocol::SessionInfo;
use thiserror::Error;

use crate::user::RemoteUser;

/// Session service errors.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The request failed.
    #[error("Request failed: {0}")]
    Request(String),

    /// The buddy has no invitation to join.
    #[error("No invitation from {0}")]
    NoInvitation(String),

    /// The service cannot be reached.
    #[error("Session service unavailable")]
    Unavailable,
}

/// Credentials for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatGrant {
    /// Session to join.
    pub session: SessionInfo,
    /// Token to join it with.
    pub token: String,
}

impl ChatGrant {
    /// Create a new grant.
    #[must_use]
    pub fn new(session: SessionInfo, token: impl Into<String>) -> Self {
        Self {
            session,
            token: token.into(),
        }
    }
}

/// Remote service issuing sessions and tokens.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Get the presence session every buddy joins.
    async fn register_session(&self) -> Result<SessionInfo, ServiceError>;

    /// Register this device under a display name, returning its connection token.
    async fn register_device(&self, name: &str) -> Result<String, ServiceError>;

    /// Create a chat session for inviting `peer`.
    async fn request_chat(&self, peer: &RemoteUser) -> Result<ChatGrant, ServiceError>;

    /// Get credentials for the chat session `peer` invited us to.
    async fn join_chat(&self, peer: &RemoteUser) -> Result<ChatGrant, ServiceError>;
}

//! In-process session service.
//!
//! Stands in for the hosted registration service: hands out the presence
//! session, device tokens and chat sessions without any network calls.

use async_trait::async_trait;
use buddy_core::{ChatGrant, RemoteUser, ServiceError, SessionService};
use buddy_protocol::SessionInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Session service backed by local counters.
pub struct LocalSessionService {
    api_key: String,
    presence_session_id: String,
    counter: AtomicU64,
}

impl LocalSessionService {
    /// Create a service handing out `presence_session_id` as the presence session.
    #[must_use]
    pub fn new(api_key: impl Into<String>, presence_session_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            presence_session_id: presence_session_id.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn token(&self, subject: &str) -> String {
        format!("tok_{}_{}", subject, self.next())
    }
}

#[async_trait]
impl SessionService for LocalSessionService {
    async fn register_session(&self) -> Result<SessionInfo, ServiceError> {
        Ok(SessionInfo::new(&self.api_key, &self.presence_session_id))
    }

    async fn register_device(&self, name: &str) -> Result<String, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::Request("Display name cannot be empty".into()));
        }
        Ok(self.token("device"))
    }

    async fn request_chat(&self, peer: &RemoteUser) -> Result<ChatGrant, ServiceError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let session = SessionInfo::new(&self.api_key, format!("chat_{:x}_{}", timestamp, self.next()));

        debug!(peer = %peer.identifier, session = %session.session_id, "Created chat session");
        Ok(ChatGrant::new(session, self.token("chat")))
    }

    async fn join_chat(&self, peer: &RemoteUser) -> Result<ChatGrant, ServiceError> {
        let session = peer
            .invitation_session_info()
            .cloned()
            .ok_or_else(|| ServiceError::NoInvitation(peer.name.clone()))?;
        Ok(ChatGrant::new(session, self.token("chat")))
    }
}

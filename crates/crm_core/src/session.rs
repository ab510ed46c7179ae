//! crates/crm_core/src/session.rs
//!
//! The session store: establishes, resolves and clears authenticated browser
//! sessions, applying an idle timeout and an absolute lifetime.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{AuthSession, Identity};
use crate::ports::{DatabaseService, PortError, PortResult};

/// How long a session may live, in total and between requests.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(30),
            max_lifetime: Duration::hours(12),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    IdleExpired,
    Expired,
}

impl SessionPolicy {
    pub fn status(&self, session: &AuthSession, now: DateTime<Utc>) -> SessionStatus {
        if now >= session.expires_at {
            SessionStatus::Expired
        } else if now - session.last_seen_at > self.idle_timeout {
            SessionStatus::IdleExpired
        } else {
            SessionStatus::Active
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn DatabaseService>,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(db: Arc<dyn DatabaseService>, policy: SessionPolicy) -> Self {
        Self { db, policy }
    }

    /// Persists a new session for a verified identity and returns it.
    /// The caller hands `session.id` to the client as its cookie token.
    pub async fn establish(&self, identity: &Identity) -> PortResult<AuthSession> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.policy.max_lifetime)
            .ok_or_else(|| PortError::Unexpected("Session lifetime out of range".to_string()))?;
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            identity: identity.clone(),
            created_at: now,
            last_seen_at: now,
            expires_at,
        };
        self.db.create_auth_session(&session).await?;
        Ok(session)
    }

    /// Resolves a token to its identity. Never fails: anything other than a
    /// live session of an active user yields `None`.
    pub async fn current(&self, token: Option<&str>) -> Option<Identity> {
        let token = token?;
        let session = match self.db.get_auth_session(token).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => return None,
            Err(e) => {
                warn!("Failed to load auth session: {}", e);
                return None;
            }
        };

        let now = Utc::now();
        match self.policy.status(&session, now) {
            SessionStatus::Active => {}
            status => {
                debug!(user_id = session.identity.user_id, ?status, "Discarding stale session");
                self.discard(token).await;
                return None;
            }
        }

        match self.db.get_user_by_id(session.identity.user_id).await {
            Ok(user) if user.is_active => {}
            Ok(_) | Err(PortError::NotFound(_)) => {
                debug!(user_id = session.identity.user_id, "Discarding session of inactive user");
                self.discard(token).await;
                return None;
            }
            Err(e) => {
                warn!("Failed to load session owner: {}", e);
                return None;
            }
        }

        if let Err(e) = self.db.touch_auth_session(token, now).await {
            warn!("Failed to refresh auth session activity: {}", e);
        }
        Some(session.identity)
    }

    /// Removes the session (logout).
    pub async fn clear(&self, token: &str) -> PortResult<()> {
        self.db.delete_auth_session(token).await
    }

    async fn discard(&self, token: &str) {
        if let Err(e) = self.db.delete_auth_session(token).await {
            warn!("Failed to delete auth session: {}", e);
        }
    }
}

//! Session identity supplied by the external authentication layer.
//!
//! Login, token refresh and storage belong to the surrounding application.
//! The real-time core only asks "who is signed in, and with which token?"
//! each time it opens a connection or issues a REST call.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// Identity of the signed-in user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Source of the current session. Consulted on every connection attempt, so
/// a refreshed token is picked up by the next reconnect.
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<AuthSession>;
}

/// A fixed session, for tools and tests.
#[derive(Clone, Debug)]
pub struct StaticSession(pub AuthSession);

impl SessionProvider for StaticSession {
    fn current(&self) -> Option<AuthSession> {
        Some(self.0.clone())
    }
}

/// Mutable session shared with the authentication layer.
#[derive(Clone, Debug, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<AuthSession>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot only ever holds a whole session or none, so a writer that
    /// panicked cannot have left it half-updated.
    fn slot(&self) -> RwLockWriteGuard<'_, Option<AuthSession>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn login(&self, session: AuthSession) {
        *self.slot() = Some(session);
    }

    /// Replace the access token, keeping the identity.
    pub fn refresh_token(&self, access_token: impl Into<String>) {
        if let Some(session) = self.slot().as_mut() {
            session.access_token = access_token.into();
        }
    }

    pub fn logout(&self) {
        *self.slot() = None;
    }
}

impl SessionProvider for SessionSlot {
    fn current(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

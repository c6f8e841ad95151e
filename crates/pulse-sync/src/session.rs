use pulse_types::models::User;

use crate::error::{Result, SyncError};

/// The user a session acts as, as resolved from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub key: String,
    pub username: String,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            key: user.key.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Token handed over by the auth provider, not yet checked against the store.
    Issued,
    Validated(Actor),
    /// Terminal.
    Revoked,
}

/// Explicit login state, passed to every component that needs to know who
/// is acting. Lifecycle: issued -> validated -> revoked.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    state: SessionState,
}

impl Session {
    pub fn issued(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            state: SessionState::Issued,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_revoked(&self) -> bool {
        self.state == SessionState::Revoked
    }

    /// The acting user. Fails unless the session was validated.
    pub fn actor(&self) -> Result<&Actor> {
        match &self.state {
            SessionState::Validated(actor) if !actor.id.is_empty() && !actor.key.is_empty() => Ok(actor),
            SessionState::Revoked => Err(SyncError::SessionRevoked),
            _ => Err(SyncError::MissingActor),
        }
    }

    pub(crate) fn validate(&mut self, actor: Actor) -> Result<&Actor> {
        if self.is_revoked() {
            return Err(SyncError::SessionRevoked);
        }
        self.state = SessionState::Validated(actor);
        self.actor()
    }

    pub fn revoke(&mut self) {
        self.state = SessionState::Revoked;
    }
}

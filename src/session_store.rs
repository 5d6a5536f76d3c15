//! Shared session state backed by a watch channel

use crate::types::{LogoutKind, PersistedSession, Session, TokenPair, User};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Cloneable handle to the process-wide session
///
/// Every clone sees the same state. Writers go through the methods below;
/// observers use [`SessionStore::subscribe`] to react to transitions.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<Session>>,
}

impl SessionStore {
    /// Create an empty (logged-out) store
    pub fn new() -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Copy of the current session
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_manual_logout(&self) -> bool {
        self.state.borrow().is_manual_logout()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.state.borrow().tokens.clone()
    }

    /// Record a successful login
    pub fn establish(&self, user: User, tokens: TokenPair) {
        info!(user_id = %user.id, role = %user.role, "Session established");
        self.state.send_modify(|session| {
            session.user = Some(user);
            session.tokens = Some(tokens);
            session.ended = None;
            session.generation = session.generation.wrapping_add(1);
        });
    }

    /// Rehydrate from whatever the host persisted. `None` leaves the store untouched.
    pub fn initialize(&self, persisted: Option<PersistedSession>) {
        match persisted {
            Some(PersistedSession { user, tokens }) => {
                debug!(user_id = %user.id, "Rehydrating persisted session");
                self.establish(user, tokens);
            }
            None => debug!("No persisted session to rehydrate"),
        }
    }

    /// What the host should persist, if anything
    pub fn snapshot(&self) -> Option<PersistedSession> {
        let session = self.state.borrow();
        Some(PersistedSession {
            user: session.user.clone()?,
            tokens: session.tokens.clone()?,
        })
    }

    /// Replace the token pair of a live session
    ///
    /// Returns `false` and changes nothing if the session was cleared in
    /// the meantime, so a late refresh response cannot resurrect it.
    pub fn set_tokens(&self, tokens: TokenPair) -> bool {
        let mut live = false;
        self.state.send_if_modified(|session| {
            live = session.is_authenticated();
            if !live || session.tokens.as_ref() == Some(&tokens) {
                return false;
            }
            session.tokens = Some(tokens);
            true
        });
        live
    }

    /// Clear the session. No-op if it is already cleared.
    ///
    /// Returns whether anything was cleared.
    pub fn clear_session(&self, manual: bool) -> bool {
        let kind = if manual {
            LogoutKind::Manual
        } else {
            LogoutKind::Forced
        };

        let cleared = self.state.send_if_modified(|session| {
            if session.user.is_none() && session.tokens.is_none() {
                return false;
            }
            session.user = None;
            session.tokens = None;
            session.ended = Some(kind);
            true
        });

        if cleared {
            info!(kind = ?kind, "Session cleared");
        }
        cleared
    }

    /// User-initiated logout
    pub fn logout(&self) -> bool {
        self.clear_session(true)
    }

    /// System-initiated logout after expiry or a failed refresh
    pub fn force_logout(&self) -> bool {
        self.clear_session(false)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Route guard for the role dashboards
//!
//! Each navigation into a protected area is checked against the session:
//! a missing or expired session redirects to the login or "session expired"
//! page, an access token close to expiry is refreshed inline first, and a
//! user whose role the route doesn't allow is sent to their own dashboard.

use crate::config::SessionConfig;
use crate::refresh::{RefreshEndpoint, Refresher};
use crate::session_store::SessionStore;
use crate::token;
use crate::types::Role;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of a navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show the requested view
    Render,
    /// No session, or the user logged out
    Login,
    /// The session was ended by the system
    SessionExpired,
    /// Authenticated, but the route belongs to another role
    Landing { role: Role, path: String },
}

impl GuardDecision {
    /// Where to send the user, `None` for [`GuardDecision::Render`]
    pub fn redirect_path<'a>(&'a self, config: &'a SessionConfig) -> Option<&'a str> {
        match self {
            GuardDecision::Render => None,
            GuardDecision::Login => Some(config.login_path.as_str()),
            GuardDecision::SessionExpired => Some(config.session_expired_path.as_str()),
            GuardDecision::Landing { path, .. } => Some(path.as_str()),
        }
    }

    pub fn into_view<V>(self, config: &SessionConfig, render: impl FnOnce() -> V) -> View<V> {
        match self.redirect_path(config) {
            Some(path) => View::Redirect(path.to_string()),
            None => View::Render(render()),
        }
    }
}

/// What the routing layer should put on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View<V> {
    /// Neutral loading indicator while the check runs
    Loading,
    Render(V),
    Redirect(String),
}

/// Progress of a single navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardPhase {
    Checking,
    Resolved(GuardDecision),
}

/// Gates protected routes on session validity and role
pub struct RouteGuard<E> {
    refresher: Refresher<E>,
    config: Arc<SessionConfig>,
}

impl<E> Clone for RouteGuard<E> {
    fn clone(&self) -> Self {
        Self {
            refresher: self.refresher.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<E: RefreshEndpoint> RouteGuard<E> {
    pub fn new(refresher: Refresher<E>, config: Arc<SessionConfig>) -> Self {
        Self { refresher, config }
    }

    fn store(&self) -> &SessionStore {
        self.refresher.store()
    }

    /// Decide whether a route requiring one of `required_roles` may render.
    /// An empty slice admits any authenticated role.
    pub async fn check(&self, required_roles: &[Role]) -> GuardDecision {
        if !self.ensure_session().await {
            return self.unauthenticated();
        }
        self.authorize(required_roles)
    }

    /// Check, then either render the protected view or redirect
    pub async fn protect<V>(&self, required_roles: &[Role], render: impl FnOnce() -> V) -> View<V> {
        self.check(required_roles)
            .await
            .into_view(&self.config, render)
    }

    /// Start checking a navigation in the background
    ///
    /// The returned [`Navigation`] shows [`View::Loading`] until the check
    /// resolves, so protected content never flashes before it is allowed.
    pub fn navigate(&self, required_roles: Vec<Role>) -> Navigation {
        let (phase_tx, phase_rx) = watch::channel(GuardPhase::Checking);
        let guard = self.clone();
        let task = tokio::spawn(async move {
            let decision = guard.check(&required_roles).await;
            debug!(decision = ?decision, "Navigation resolved");
            phase_tx.send_replace(GuardPhase::Resolved(decision));
        });

        Navigation {
            phase: phase_rx,
            config: Arc::clone(&self.config),
            task,
        }
    }

    /// `true` if the session is usable, refreshing the access token if needed
    async fn ensure_session(&self) -> bool {
        let session = self.store().session();
        let tokens = match session.tokens {
            Some(tokens) if session.user.is_some() => tokens,
            _ => return false,
        };

        if token::is_expired(tokens.refresh_token.as_str(), SessionConfig::REFRESH_BUFFER_SECS) {
            warn!("Refresh token expired during navigation, forcing logout");
            self.store().force_logout();
            return false;
        }

        if token::is_expired(tokens.access_token.as_str(), self.config.access_buffer_secs) {
            debug!("Access token close to expiry, refreshing before navigation");
            if let Err(e) = self.refresher.refresh().await {
                warn!(error = %e, "Refresh during navigation failed");
                return false;
            }
        }

        true
    }

    fn unauthenticated(&self) -> GuardDecision {
        if self.store().is_manual_logout() {
            GuardDecision::Login
        } else {
            GuardDecision::SessionExpired
        }
    }

    fn authorize(&self, required_roles: &[Role]) -> GuardDecision {
        let Some(user) = self.store().user() else {
            return self.unauthenticated();
        };

        let Some(role) = user.role() else {
            warn!(user_id = %user.id, role = %user.role, "Unknown role, forcing logout");
            self.store().force_logout();
            return GuardDecision::SessionExpired;
        };

        if required_roles.is_empty() || required_roles.contains(&role) {
            return GuardDecision::Render;
        }

        debug!(role = %role, "Role not allowed here, redirecting to its dashboard");
        GuardDecision::Landing {
            role,
            path: self.config.landing_pages.for_role(role).to_string(),
        }
    }
}

/// A navigation whose check may still be running
pub struct Navigation {
    phase: watch::Receiver<GuardPhase>,
    config: Arc<SessionConfig>,
    task: JoinHandle<()>,
}

impl Navigation {
    pub fn phase(&self) -> GuardPhase {
        self.phase.borrow().clone()
    }

    /// Current view: [`View::Loading`] while checking
    pub fn view<V>(&self, render: impl FnOnce() -> V) -> View<V> {
        match self.phase() {
            GuardPhase::Checking => View::Loading,
            GuardPhase::Resolved(decision) => decision.into_view(&self.config, render),
        }
    }

    /// Wait for the check to finish
    pub async fn resolved(&mut self) -> GuardDecision {
        match self
            .phase
            .wait_for(|phase| matches!(phase, GuardPhase::Resolved(_)))
            .await
        {
            Ok(phase) => match &*phase {
                GuardPhase::Resolved(decision) => decision.clone(),
                GuardPhase::Checking => GuardDecision::Login,
            },
            // check task is gone without an answer; never render
            Err(_) => GuardDecision::Login,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

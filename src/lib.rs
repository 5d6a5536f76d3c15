//! Campus session manager
//!
//! Session handling for the campus admin console: a dual-token (access +
//! refresh) expiry tracker, a background monitor that refreshes the access
//! token before it expires, and a route guard that gates the admin, teacher,
//! student and parent dashboards on session validity and role.

pub mod config;
pub mod error;
pub mod guard;
pub mod manager;
pub mod monitor;
pub mod refresh;
pub mod session_store;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{LandingPages, SessionConfig};
pub use error::{Result, SessionError};
pub use guard::{GuardDecision, GuardPhase, Navigation, RouteGuard, View};
pub use manager::SessionManager;
pub use monitor::{CheckOutcome, MonitorHandle, TokenMonitor};
pub use refresh::{HttpRefreshEndpoint, RefreshEndpoint, Refresher};
pub use session_store::SessionStore;
pub use types::{LogoutKind, PersistedSession, Role, Session, TokenPair, TokenStatus, User};

//! Type definitions for the session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Console role. Each role owns one dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Teacher, Role::Student, Role::Parent];

    /// Parse a role name as sent by the backend. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed-in user
///
/// `role` is kept as the raw string the backend sent so that an unknown
/// role survives long enough to be detected by the route guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: String,
    /// Profile fields (name, email, logo...) used by the console screens
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role: role.as_str().to_string(),
            profile: serde_json::Map::new(),
        }
    }

    /// The user's role, or `None` if the backend sent one we don't know
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

/// Authentication tokens (access + refresh)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// How the last session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogoutKind {
    /// The user asked to log out
    Manual,
    /// The session expired or a refresh failed
    Forced,
}

/// Process-wide session state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub tokens: Option<TokenPair>,
    pub ended: Option<LogoutKind>,
    /// Bumped on every login, so observers can tell a new session from a token swap
    pub generation: u64,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.tokens.is_some()
    }

    /// `false` only after a forced logout. A session that never existed
    /// counts as manual so navigation lands on the login page.
    pub fn is_manual_logout(&self) -> bool {
        self.ended != Some(LogoutKind::Forced)
    }
}

/// What the host persists between launches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: User,
    pub tokens: TokenPair,
}

/// Advisory token status, recomputed on every monitor check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStatus {
    pub access_token_valid: bool,
    pub refresh_token_valid: bool,
    pub time_until_access_expiry: Duration,
    pub time_until_refresh_expiry: Duration,
}

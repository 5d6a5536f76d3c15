//! Session manager configuration

use crate::error::{Result, SessionError};
use crate::types::Role;
use std::time::Duration;

/// Default monitor check interval (60 seconds)
const CHECK_INTERVAL_SECS: u64 = 60;

/// Refresh the access token this many seconds before it expires
const ACCESS_BUFFER_SECS: u64 = 30;

/// Default timeout for the refresh call
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Dashboard path for each role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPages {
    pub admin: String,
    pub teacher: String,
    pub student: String,
    pub parent: String,
}

impl LandingPages {
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin,
            Role::Teacher => &self.teacher,
            Role::Student => &self.student,
            Role::Parent => &self.parent,
        }
    }
}

impl Default for LandingPages {
    fn default() -> Self {
        Self {
            admin: "/admin/dashboard".to_string(),
            teacher: "/teacher/dashboard".to_string(),
            student: "/student/dashboard".to_string(),
            parent: "/parent/dashboard".to_string(),
        }
    }
}

/// Configuration for the session manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Full URL of the token refresh endpoint
    pub refresh_url: String,

    /// How often the monitor inspects the tokens
    /// Default: 60 seconds
    pub check_interval: Duration,

    /// Treat the access token as expired this many seconds early
    /// Default: 30 seconds
    pub access_buffer_secs: u64,

    /// Timeout applied to the refresh call
    /// Default: 15 seconds
    pub request_timeout: Duration,

    /// Where manual logouts (and visitors without a session) are sent
    pub login_path: String,

    /// Where forced logouts are sent
    pub session_expired_path: String,

    pub landing_pages: LandingPages,
}

impl SessionConfig {
    /// Refresh tokens are never used past their literal expiry
    pub const REFRESH_BUFFER_SECS: u64 = 0;

    pub fn new(refresh_url: impl Into<String>) -> Self {
        Self {
            refresh_url: refresh_url.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let refresh_url = std::env::var("SESSION_REFRESH_URL").map_err(|_| {
            SessionError::Configuration("SESSION_REFRESH_URL is not set".to_string())
        })?;

        let mut config = Self::new(refresh_url);

        if let Some(secs) = env_secs("SESSION_CHECK_INTERVAL_SECS")? {
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("SESSION_ACCESS_BUFFER_SECS")? {
            config.access_buffer_secs = secs;
        }
        if let Some(secs) = env_secs("SESSION_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(path) = std::env::var("SESSION_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Ok(path) = std::env::var("SESSION_EXPIRED_PATH") {
            config.session_expired_path = path;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn access_buffer_secs(mut self, secs: u64) -> Self {
        self.access_buffer_secs = secs;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn landing_pages(mut self, pages: LandingPages) -> Self {
        self.landing_pages = pages;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(SessionError::Configuration(
                "check interval must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SessionError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_url: String::new(),
            check_interval: Duration::from_secs(CHECK_INTERVAL_SECS),
            access_buffer_secs: ACCESS_BUFFER_SECS,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            login_path: "/login".to_string(),
            session_expired_path: "/session-expired".to_string(),
            landing_pages: LandingPages::default(),
        }
    }
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SessionError::Configuration(format!("{name} must be a whole number of seconds"))),
        Err(_) => Ok(None),
    }
}

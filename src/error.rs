//! Error types for the session manager

use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

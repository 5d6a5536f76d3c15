//! Token refresh shared by the monitor and the route guard

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session_store::SessionStore;
use crate::token;
use crate::types::TokenPair;
use async_singleflight::Group;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Singleflight key. There is one session per process.
const SESSION_KEY: &str = "session";

/// Macro to check HTTP response status and return error if not successful
macro_rules! check_response {
    ($response:expr, $error_msg:expr) => {
        if !$response.status().is_success() {
            let status = $response.status();
            let text = $response.text().await.unwrap_or_default();
            return Err(SessionError::RefreshRejected(format!(
                "{} with status {}: {}",
                $error_msg, status, text
            )));
        }
    };
}

/// Network seam for exchanging a refresh token for a new pair
pub trait RefreshEndpoint: Send + Sync + 'static {
    /// Exchange `refresh_token` for a new token pair
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<TokenPair>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefreshResponse {
    Wrapped { data: RefreshPayload },
    Flat(RefreshPayload),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    #[serde(alias = "access_token")]
    access_token: String,
    #[serde(alias = "refresh_token")]
    refresh_token: String,
}

impl RefreshResponse {
    fn into_pair(self) -> Result<TokenPair> {
        let payload = match self {
            RefreshResponse::Wrapped { data } => data,
            RefreshResponse::Flat(payload) => payload,
        };

        if payload.access_token.is_empty() || payload.refresh_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "refresh response carried an empty token".to_string(),
            ));
        }

        Ok(TokenPair {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        })
    }
}

/// Refresh endpoint reached over HTTP
///
/// POSTs `{"refreshToken": ...}` as JSON and expects
/// `{"accessToken": ..., "refreshToken": ...}` back, either at the top
/// level or under `data`.
pub struct HttpRefreshEndpoint {
    url: String,
    http_client: Client,
}

impl HttpRefreshEndpoint {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.refresh_url.trim().is_empty() {
            return Err(SessionError::Configuration(
                "refresh_url must not be empty".to_string(),
            ));
        }

        let http_client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            url: config.refresh_url.clone(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        check_response!(response, "Token refresh failed");

        let body = response.text().await?;
        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| SessionError::InvalidResponse(format!("unexpected refresh payload: {e}")))?;

        parsed.into_pair()
    }
}

/// The shared refresh operation
///
/// Applies the outcome to the session: new tokens on success, a forced
/// logout on any failure. Concurrent callers share one network call.
pub struct Refresher<E> {
    store: SessionStore,
    endpoint: Arc<E>,
    /// Error type is String because singleflight requires a cloneable error
    singleflight: Arc<Group<TokenPair, String>>,
}

impl<E> Clone for Refresher<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            endpoint: Arc::clone(&self.endpoint),
            singleflight: Arc::clone(&self.singleflight),
        }
    }
}

impl<E: RefreshEndpoint> Refresher<E> {
    pub fn new(store: SessionStore, endpoint: Arc<E>) -> Self {
        Self {
            store,
            endpoint,
            singleflight: Arc::new(Group::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Exchange the current refresh token for a new pair
    ///
    /// Callers are expected to have checked the refresh token already; an
    /// expired one is still caught here and never reaches the network.
    pub async fn refresh(&self) -> Result<TokenPair> {
        let Some(tokens) = self.store.tokens() else {
            return Err(SessionError::NotAuthenticated);
        };

        if token::is_expired(tokens.refresh_token.as_str(), SessionConfig::REFRESH_BUFFER_SECS) {
            warn!("Refresh token expired, forcing logout");
            self.store.force_logout();
            return Err(SessionError::RefreshTokenExpired);
        }

        let endpoint = &self.endpoint;
        let refresh_token = tokens.refresh_token;
        let (success_opt, error_opt, shared) = self
            .singleflight
            .work(SESSION_KEY, async {
                endpoint
                    .refresh(&refresh_token)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;

        match (success_opt, error_opt) {
            (Some(pair), None) => {
                if !self.store.set_tokens(pair.clone()) {
                    debug!("Session ended while refreshing, discarding new tokens");
                    return Err(SessionError::NotAuthenticated);
                }
                info!(shared = %shared, "Access token refreshed");
                Ok(pair)
            }
            (None, Some(err_msg)) => {
                warn!(error = %err_msg, "Token refresh failed, forcing logout");
                self.store.force_logout();
                Err(SessionError::RefreshRejected(err_msg))
            }
            _ => {
                warn!("Token refresh ended without a result, forcing logout");
                self.store.force_logout();
                Err(SessionError::RefreshRejected(
                    "Unknown error during token refresh".to_string(),
                ))
            }
        }
    }
}

//! Test helpers: unsigned tokens and a scripted refresh endpoint

use crate::error::{Result, SessionError};
use crate::refresh::RefreshEndpoint;
use crate::token::now_secs;
use crate::types::TokenPair;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static SERIAL: AtomicU64 = AtomicU64::new(0);

/// JWT-shaped token with an arbitrary payload and a junk signature
pub(crate) fn mint_with_payload(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Unique token expiring `expires_in_secs` from now (negative for the past)
pub(crate) fn mint(expires_in_secs: i64) -> String {
    let serial = SERIAL.fetch_add(1, Ordering::Relaxed);
    mint_with_payload(serde_json::json!({
        "exp": now_secs() + expires_in_secs,
        "jti": serial,
    }))
}

pub(crate) fn pair(access_in_secs: i64, refresh_in_secs: i64) -> TokenPair {
    TokenPair::new(mint(access_in_secs), mint(refresh_in_secs))
}

/// Refresh endpoint that either always succeeds with a fresh pair or always fails
pub(crate) struct ScriptedEndpoint {
    fail: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedEndpoint {
    fn build(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(fail),
            delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn succeeding() -> Arc<Self> {
        Self::build(false)
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::build(true)
    }

    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented so far, in order
    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl RefreshEndpoint for ScriptedEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(refresh_token.to_string());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::RefreshRejected("network unreachable".to_string()));
        }
        Ok(pair(900, 86_400))
    }
}

//! Token inspection
//!
//! Reads the `exp` claim out of a JWT-shaped token without checking the
//! signature. This only decides when to refresh; the backend still
//! authorizes every call. Anything that fails to decode is treated as
//! expired.

use crate::error::{Result, SessionError};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// base64url, padding optional
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Payload claims we care about
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, Unix seconds
    #[serde(deserialize_with = "deserialize_exp")]
    pub exp: i64,
    /// Any JSON type; only `exp` decides whether the token decodes
    #[serde(default)]
    pub sub: Option<serde_json::Value>,
    #[serde(default)]
    pub role: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn deserialize_exp<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let exp = f64::deserialize(deserializer)?;
    Ok(exp.floor() as i64)
}

/// Decode the payload segment of a token
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => {
            return Err(SessionError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| SessionError::MalformedToken(format!("payload is not base64url: {e}")))?;

    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn expiry_secs(token: Option<&str>) -> Option<i64> {
    decode_claims(token?).ok().map(|claims| claims.exp)
}

/// `true` if the token is missing, malformed, or expires within `buffer_secs`
pub fn is_expired<'a>(token: impl Into<Option<&'a str>>, buffer_secs: u64) -> bool {
    is_expired_at(token, buffer_secs, now_secs())
}

/// [`is_expired`] against an explicit clock (Unix seconds)
pub fn is_expired_at<'a>(token: impl Into<Option<&'a str>>, buffer_secs: u64, now_secs: i64) -> bool {
    let buffer_secs = i64::try_from(buffer_secs).unwrap_or(i64::MAX);
    match expiry_secs(token.into()) {
        Some(exp) => exp < now_secs.saturating_add(buffer_secs),
        None => true,
    }
}

/// Expiry in milliseconds since the epoch
pub fn expiry_time_millis<'a>(token: impl Into<Option<&'a str>>) -> Option<i64> {
    expiry_secs(token.into()).map(|exp| exp.saturating_mul(1000))
}

/// Milliseconds until the token expires, `0` if expired or unreadable
pub fn time_until_expiry_millis<'a>(token: impl Into<Option<&'a str>>) -> u64 {
    time_until_expiry_millis_at(token, now_millis())
}

/// [`time_until_expiry_millis`] against an explicit clock (Unix milliseconds)
pub fn time_until_expiry_millis_at<'a>(token: impl Into<Option<&'a str>>, now_millis: i64) -> u64 {
    expiry_time_millis(token)
        .map(|expiry| expiry.saturating_sub(now_millis).max(0) as u64)
        .unwrap_or(0)
}

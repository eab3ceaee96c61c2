//! API key authentication
//!
//! When `API_KEY` is configured every `/api/*` route requires it, sent either
//! as the `X-API-Key` header or as an `api_key` query parameter (browser
//! WebSocket clients cannot set headers).

use axum::extract::Query;
use axum::http::Uri;
use std::collections::HashMap;

/// Header carrying the key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameter carrying the key
pub const API_KEY_PARAM: &str = "api_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid or missing API key")]
pub struct Unauthorized;

/// Checks presented credentials against the configured key
#[derive(Clone, Default)]
pub struct ApiKeyGuard {
    expected: Option<String>,
}

impl ApiKeyGuard {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|key| !key.is_empty()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Accept when auth is off, or when either credential matches
    pub fn check(&self, header: Option<&str>, uri: &Uri) -> Result<(), Unauthorized> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(());
        };

        let presented = match header {
            Some(key) => Some(key.to_string()),
            None => query_key(uri),
        };
        match presented {
            Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => Ok(()),
            _ => Err(Unauthorized),
        }
    }
}

impl std::fmt::Debug for ApiKeyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGuard")
            .field("enabled", &self.enabled())
            .finish()
    }
}

/// Percent-decoded `api_key` query parameter
fn query_key(uri: &Uri) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove(API_KEY_PARAM).filter(|key| !key.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

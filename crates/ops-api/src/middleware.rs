//! Admin access gate.
//!
//! Admin routes are gated by a permission check owned by an external
//! identity system; the API only sees the `AdminGate` trait. A static-token
//! implementation ships for development and tests.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::common::ApiError;
use crate::AppState;

/// Identity attached to an authorized admin request
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub subject: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("missing or invalid credentials")]
    Unauthorized,
    #[error("permission denied: {0}")]
    Forbidden(String),
}

/// Permission-checking gate consumed by every admin route.
#[async_trait]
pub trait AdminGate: Send + Sync {
    async fn authorize(
        &self,
        bearer: Option<&str>,
        permission: &str,
    ) -> Result<AdminContext, GateError>;
}

/// Grants every permission to the holder of a single shared token.
pub struct StaticTokenGate {
    token: String,
}

impl StaticTokenGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AdminGate for StaticTokenGate {
    async fn authorize(
        &self,
        bearer: Option<&str>,
        _permission: &str,
    ) -> Result<AdminContext, GateError> {
        match bearer {
            Some(token) if bool::from(token.as_bytes().ct_eq(self.token.as_bytes())) => {
                Ok(AdminContext {
                    subject: "static-admin".to_string(),
                })
            }
            _ => Err(GateError::Unauthorized),
        }
    }
}

/// Extracts the bearer token from an Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Runs the gate for a request; maps gate failures to API errors.
pub async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    permission: &str,
) -> Result<AdminContext, ApiError> {
    state
        .gate
        .authorize(bearer_token(headers), permission)
        .await
        .map_err(|e| match e {
            GateError::Unauthorized => ApiError::unauthorized(),
            GateError::Forbidden(message) => ApiError::forbidden(message),
        })
}

//! Bearer token authentication.
//!
//! Credential storage and verification live outside this service. Requests
//! carry `Authorization: Bearer <token>` and an [`Authenticator`] turns the
//! token into a [`Principal`]. The shipped implementation is a static table
//! read from configuration.

use std::sync::Arc;

use airguard_types::Role;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::api::ApiResponse;
use crate::config::{AuthConfig, TokenConfig};
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated account behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub account: String,
    pub role: Role,
}

impl Principal {
    pub fn new(account: impl Into<String>, role: Role) -> Self {
        Self {
            account: account.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Resolves bearer tokens to principals.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` means the token is not recognized.
    async fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table from `[[auth.tokens]]`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    entries: Vec<TokenConfig>,
}

impl StaticTokens {
    pub fn new(entries: Vec<TokenConfig>) -> Self {
        Self { entries }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.clone())
    }
}

#[async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        // Compare against every entry so timing does not reveal the match position
        let mut found = None;
        for entry in &self.entries {
            if bool::from(entry.token.as_bytes().ct_eq(token.as_bytes())) && found.is_none() {
                found = Some(Principal::new(entry.account.clone(), entry.role));
            }
        }
        found
    }
}

/// Extractor for an authenticated request.
///
/// Missing token is 401; an unrecognized token is 403.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Access token required".into()))?;

        match state.auth.authenticate(token).await {
            Some(principal) => {
                debug!("Authenticated {} for {}", principal.account, parts.uri.path());
                Ok(Self {
                    principal,
                    token: token.to_string(),
                })
            }
            None => {
                warn!("Rejected unknown token for {}", parts.uri.path());
                Err(AppError::Forbidden("Invalid or expired token".into()))
            }
        }
    }
}

/// `POST /api/auth/login`: confirm the token and hand it to the device.
pub async fn login(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> ApiResponse<Principal> {
    state.gateway.send_credential(&auth.token);
    ApiResponse::ok(auth.principal).with_message("Logged in successfully")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StaticTokens {
        StaticTokens::new(vec![
            TokenConfig {
                token: "alice-token-0123456789".into(),
                account: "alice".into(),
                role: Role::User,
            },
            TokenConfig {
                token: "admin-token-0123456789".into(),
                account: "root".into(),
                role: Role::Admin,
            },
        ])
    }

    #[tokio::test]
    async fn test_static_tokens_resolve() {
        let auth = table();

        let alice = auth.authenticate("alice-token-0123456789").await.unwrap();
        assert_eq!(alice, Principal::new("alice", Role::User));
        assert!(!alice.is_admin());

        let root = auth.authenticate("admin-token-0123456789").await.unwrap();
        assert!(root.is_admin());
    }

    #[tokio::test]
    async fn test_static_tokens_reject_unknown() {
        let auth = table();
        assert!(auth.authenticate("alice-token-012345678").await.is_none());
        assert!(auth.authenticate("").await.is_none());
        assert!(StaticTokens::default().authenticate("x").await.is_none());
    }
}

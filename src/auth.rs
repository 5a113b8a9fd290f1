//! Authentication Collaborator
//!
//! The engine never validates token cryptography itself; it hands the raw
//! bearer token to an [`AuthVerifier`] and acts on the claims that come
//! back. `Ok(None)` means the token is invalid or revoked and the caller
//! degrades to device identity; `Err` means the auth backend itself
//! failed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::quota::PremiumStatus;

/// Claims carried by a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthClaims {
    /// Stable user id
    pub user_id: String,

    /// Premium entitlement
    pub premium: PremiumStatus,
}

/// Auth backend errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth backend unavailable: {0}")]
    Backend(String),
}

/// Token verification seam
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verify `token`. `Ok(None)` marks an invalid or revoked token;
    /// `Err` marks a backend failure.
    async fn verify(&self, token: &str) -> Result<Option<AuthClaims>, AuthError>;
}

/// Static in-memory verifier for tests, the CLI, and single-node setups
#[derive(Debug, Clone, Default)]
pub struct StaticAuthVerifier {
    tokens: Arc<RwLock<HashMap<String, AuthClaims>>>,
}

impl StaticAuthVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a verifier pre-loaded with `(token, claims)` pairs
    pub fn with_tokens<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (String, AuthClaims)>,
    {
        Self {
            tokens: Arc::new(RwLock::new(tokens.into_iter().collect())),
        }
    }

    /// Register a token
    pub async fn insert(&self, token: &str, claims: AuthClaims) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.to_string(), claims);
    }

    /// Drop a token. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        let mut tokens = self.tokens.write().await;
        tokens.remove(token).is_some()
    }
}

#[async_trait]
impl AuthVerifier for StaticAuthVerifier {
    async fn verify(&self, token: &str) -> Result<Option<AuthClaims>, AuthError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(token).cloned())
    }
}

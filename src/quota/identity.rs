//! Quota Identity
//!
//! Resolution of an incoming request to the identity quota is tracked
//! against: a registered user (bearer token verified by the auth
//! collaborator) or an anonymous device (fingerprint and client IP, both
//! required). A request that can prove neither is rejected outright so
//! that omitting identifiers never bypasses metering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::ledger::LedgerKey;
use crate::auth::AuthVerifier;
use crate::error::TryOnError;

/// Premium entitlement carried by authenticated identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PremiumStatus {
    /// Whether a premium plan is attached
    pub active: bool,

    /// Plan expiry; `None` means no expiry
    pub expires_at: Option<DateTime<Utc>>,
}

impl PremiumStatus {
    /// No premium plan
    pub fn none() -> Self {
        Self::default()
    }

    /// Premium with no expiry
    pub fn lifetime() -> Self {
        Self {
            active: true,
            expires_at: None,
        }
    }

    /// Premium expiring at `expires_at`
    pub fn until(expires_at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            expires_at: Some(expires_at),
        }
    }

    /// Active and unexpired as of `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

/// The identity quota decisions are keyed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaIdentity {
    /// Registered user
    Authenticated {
        user_id: String,
        premium: PremiumStatus,
    },

    /// Anonymous device; both factors are always present
    Anonymous { fingerprint: String, ip: IpAddr },
}

impl QuotaIdentity {
    /// Ledger key this identity's usage rows live under
    pub fn ledger_key(&self) -> LedgerKey {
        match self {
            Self::Authenticated { user_id, .. } => LedgerKey::user(user_id),
            Self::Anonymous { fingerprint, ip } => LedgerKey::device(fingerprint, *ip),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }
}

/// Per-request identity material, as extracted by the transport layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw bearer token, if the client sent one
    pub bearer_token: Option<String>,

    /// Device fingerprint header value
    pub fingerprint: Option<String>,

    /// Client IP as seen by the edge
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    /// Context for an anonymous device
    pub fn anonymous(fingerprint: &str, ip: IpAddr) -> Self {
        Self {
            bearer_token: None,
            fingerprint: Some(fingerprint.to_string()),
            client_ip: Some(ip),
        }
    }

    /// Context carrying a bearer token
    pub fn bearer(token: &str) -> Self {
        Self {
            bearer_token: Some(token.to_string()),
            fingerprint: None,
            client_ip: None,
        }
    }
}

/// Resolves request contexts to quota identities
pub struct IdentityResolver {
    auth: Arc<dyn AuthVerifier>,
}

impl IdentityResolver {
    pub fn new(auth: Arc<dyn AuthVerifier>) -> Self {
        Self { auth }
    }

    /// Resolve `ctx` to the identity to meter.
    ///
    /// A token that verifies wins. A token that is invalid or revoked falls
    /// through to the device path rather than erroring, so stale sessions
    /// degrade to anonymous access. The device path requires both the
    /// fingerprint and the client IP.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<QuotaIdentity, TryOnError> {
        if let Some(token) = ctx.bearer_token.as_deref() {
            if let Some(claims) = self.auth.verify(token).await? {
                return Ok(QuotaIdentity::Authenticated {
                    user_id: claims.user_id,
                    premium: claims.premium,
                });
            }
            debug!("bearer token rejected, trying device identity");
        }

        let fingerprint = ctx
            .fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|fp| !fp.is_empty());

        match (fingerprint, ctx.client_ip) {
            (Some(fingerprint), Some(ip)) => Ok(QuotaIdentity::Anonymous {
                fingerprint: fingerprint.to_string(),
                ip,
            }),
            _ => Err(TryOnError::DeviceFingerprintRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthClaims, StaticAuthVerifier};
    use chrono::Duration;

    async fn resolver_with_token(token: &str, claims: AuthClaims) -> IdentityResolver {
        let verifier = StaticAuthVerifier::new();
        verifier.insert(token, claims).await;
        IdentityResolver::new(Arc::new(verifier))
    }

    #[test]
    fn test_premium_activity() {
        let now = Utc::now();
        assert!(!PremiumStatus::none().is_active(now));
        assert!(PremiumStatus::lifetime().is_active(now));
        assert!(PremiumStatus::until(now + Duration::days(1)).is_active(now));
        assert!(!PremiumStatus::until(now - Duration::days(1)).is_active(now));
    }

    #[test]
    fn test_ledger_key_mapping() {
        let user = QuotaIdentity::Authenticated {
            user_id: "user-1".to_string(),
            premium: PremiumStatus::none(),
        };
        assert_eq!(user.ledger_key(), LedgerKey::user("user-1"));

        let anon = QuotaIdentity::Anonymous {
            fingerprint: "fp-1".to_string(),
            ip: "1.2.3.4".parse().unwrap(),
        };
        assert_eq!(
            anon.ledger_key(),
            LedgerKey::device("fp-1", "1.2.3.4".parse().unwrap())
        );
        assert!(anon.is_anonymous());
    }

    #[tokio::test]
    async fn test_valid_token_resolves_to_user() {
        let resolver = resolver_with_token(
            "tok-1",
            AuthClaims {
                user_id: "user-1".to_string(),
                premium: PremiumStatus::lifetime(),
            },
        )
        .await;

        let identity = resolver
            .resolve(&RequestContext::bearer("tok-1"))
            .await
            .unwrap();
        match identity {
            QuotaIdentity::Authenticated { user_id, premium } => {
                assert_eq!(user_id, "user-1");
                assert!(premium.is_active(Utc::now()));
            }
            other => panic!("expected authenticated identity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_token_falls_back_to_device() {
        let resolver = IdentityResolver::new(Arc::new(StaticAuthVerifier::new()));
        let mut ctx = RequestContext::anonymous("fp-1", "1.2.3.4".parse().unwrap());
        ctx.bearer_token = Some("stale-token".to_string());

        let identity = resolver.resolve(&ctx).await.unwrap();
        assert!(identity.is_anonymous());
    }

    #[tokio::test]
    async fn test_missing_fingerprint_is_rejected() {
        let resolver = IdentityResolver::new(Arc::new(StaticAuthVerifier::new()));
        let ctx = RequestContext {
            bearer_token: None,
            fingerprint: None,
            client_ip: Some("1.2.3.4".parse().unwrap()),
        };

        let err = resolver.resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, TryOnError::DeviceFingerprintRequired));
    }

    #[tokio::test]
    async fn test_missing_ip_is_rejected() {
        let resolver = IdentityResolver::new(Arc::new(StaticAuthVerifier::new()));
        let ctx = RequestContext {
            bearer_token: None,
            fingerprint: Some("fp-1".to_string()),
            client_ip: None,
        };

        let err = resolver.resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, TryOnError::DeviceFingerprintRequired));
    }

    #[tokio::test]
    async fn test_blank_fingerprint_is_rejected() {
        let resolver = IdentityResolver::new(Arc::new(StaticAuthVerifier::new()));
        let ctx = RequestContext::anonymous("   ", "1.2.3.4".parse().unwrap());

        let err = resolver.resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, TryOnError::DeviceFingerprintRequired));
    }
}

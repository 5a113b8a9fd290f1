//! Quota Policy
//!
//! Read-side evaluation: decides whether an identity may generate right
//! now. Evaluation never consumes quota; consumption is the coordinator's
//! job and happens only after work actually succeeded.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::config::QuotaConfig;
use super::identity::QuotaIdentity;
use super::ledger::{LedgerKey, LedgerStore, QuotaError};

/// Sentinel used for `used`/`limit`/`remaining` when no numeric cap applies
pub const UNLIMITED: i64 = -1;

/// Point-in-time quota standing, as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Whether a generation may start right now
    pub can_generate: bool,

    /// Units consumed in the current period (`-1` = unlimited)
    pub used: i64,

    /// Period cap (`-1` = unlimited)
    pub limit: i64,

    /// Units left in the period (`-1` = unlimited)
    pub remaining: i64,
}

impl QuotaStatus {
    /// Status for premium users and disabled enforcement
    pub fn unlimited() -> Self {
        Self {
            can_generate: true,
            used: UNLIMITED,
            limit: UNLIMITED,
            remaining: UNLIMITED,
        }
    }

    /// Status for `used` consumed units against a cap of `limit`
    pub fn within(used: u32, limit: u32) -> Self {
        Self {
            can_generate: used < limit,
            used: used as i64,
            limit: limit as i64,
            remaining: limit.saturating_sub(used) as i64,
        }
    }

    /// Whether this status carries the unlimited sentinels
    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }
}

/// Quota evaluation engine
pub struct QuotaPolicy {
    config: QuotaConfig,
    store: Arc<dyn LedgerStore>,
}

impl QuotaPolicy {
    /// Create a policy over a ledger store
    pub fn new(config: QuotaConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self { config, store }
    }

    /// Decide whether `identity` may generate right now.
    ///
    /// Looks up (lazily creating or rolling forward) the identity's usage
    /// row for the current UTC period. For anonymous identities the
    /// decision reads the IP-wide sum, so swapping fingerprints behind one
    /// IP cannot mint fresh allowance; the device row opened here is the
    /// one a later increment lands on.
    pub async fn evaluate(&self, identity: &QuotaIdentity) -> Result<QuotaStatus, QuotaError> {
        if !self.config.enabled {
            return Ok(QuotaStatus::unlimited());
        }

        let now = Utc::now();
        let today = now.date_naive();

        let status = match identity {
            QuotaIdentity::Authenticated { user_id, premium } => {
                if premium.is_active(now) {
                    return Ok(QuotaStatus::unlimited());
                }
                let period = self.config.user_period.start(today);
                let entry = self
                    .store
                    .open_period(&LedgerKey::user(user_id), period)
                    .await?;
                QuotaStatus::within(entry.used_count, self.config.user_limit)
            }
            QuotaIdentity::Anonymous { fingerprint, ip } => {
                self.store
                    .open_period(&LedgerKey::device(fingerprint, *ip), today)
                    .await?;
                let used = self.store.used_by_ip(*ip, today).await?;
                QuotaStatus::within(used, self.config.anonymous_daily_limit)
            }
        };

        debug!(
            identity = %identity.ledger_key(),
            used = status.used,
            limit = status.limit,
            allowed = status.can_generate,
            "quota evaluated"
        );
        Ok(status)
    }
}

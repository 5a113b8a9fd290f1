//! Increment Coordinator
//!
//! Write side of the quota engine: consumes units after metered work
//! succeeded. Callers sequence this strictly after the vendor reported at
//! least one success. An increment that finds no row means the check step
//! was skipped; that is an ordering bug to surface, never a row to
//! fabricate.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use super::config::QuotaConfig;
use super::identity::QuotaIdentity;
use super::ledger::{LedgerEntry, LedgerKey, LedgerStore, QuotaError};
use super::policy::QuotaStatus;
use crate::metrics;

/// Post-success quota consumption
pub struct IncrementCoordinator {
    config: QuotaConfig,
    store: Arc<dyn LedgerStore>,
}

impl IncrementCoordinator {
    /// Create a coordinator over a ledger store
    pub fn new(config: QuotaConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self { config, store }
    }

    /// Consume `amount` units for `identity` and return the updated
    /// standing.
    ///
    /// Premium identities and disabled enforcement return the unlimited
    /// status without touching the ledger. Anonymous standings are
    /// recomputed from the IP-wide sum after the device row is bumped.
    pub async fn increment(
        &self,
        identity: &QuotaIdentity,
        amount: u32,
    ) -> Result<QuotaStatus, QuotaError> {
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
                    .increment_row(&LedgerKey::user(user_id), period, amount)
                    .await?;
                QuotaStatus::within(entry.used_count, self.config.user_limit)
            }
            QuotaIdentity::Anonymous { fingerprint, ip } => {
                let key = LedgerKey::device(fingerprint, *ip);
                self.increment_row(&key, today, amount).await?;
                let used = self.store.used_by_ip(*ip, today).await?;
                QuotaStatus::within(used, self.config.anonymous_daily_limit)
            }
        };

        metrics::QUOTA_INCREMENTS_TOTAL.inc();
        debug!(
            identity = %identity.ledger_key(),
            amount,
            used = status.used,
            remaining = status.remaining,
            "quota consumed"
        );
        Ok(status)
    }

    async fn increment_row(
        &self,
        key: &LedgerKey,
        period: NaiveDate,
        amount: u32,
    ) -> Result<LedgerEntry, QuotaError> {
        self.store
            .increment(key, period, amount)
            .await
            .map_err(|err| {
                if matches!(err, QuotaError::NoQuotaRecord { .. }) {
                    metrics::QUOTA_INVARIANT_VIOLATIONS_TOTAL.inc();
                    error!(identity = %key, %period, "increment without prior quota check");
                }
                err
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::identity::PremiumStatus;
    use crate::quota::ledger::InMemoryLedger;
    use crate::quota::policy::QuotaPolicy;

    fn anon(fp: &str, ip: &str) -> QuotaIdentity {
        QuotaIdentity::Anonymous {
            fingerprint: fp.to_string(),
            ip: ip.parse().unwrap(),
        }
    }

    fn setup() -> (QuotaPolicy, IncrementCoordinator, InMemoryLedger) {
        let store = InMemoryLedger::new();
        let policy = QuotaPolicy::new(QuotaConfig::default(), Arc::new(store.clone()));
        let coordinator =
            IncrementCoordinator::new(QuotaConfig::default(), Arc::new(store.clone()));
        (policy, coordinator, store)
    }

    #[tokio::test]
    async fn test_increment_without_check_is_rejected() {
        let (_, coordinator, store) = setup();

        let err = coordinator
            .increment(&anon("fp-1", "1.2.3.4"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::NoQuotaRecord { .. }));
        // The failed increment must not have created a row.
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_check_then_exhaust_daily_allowance() {
        let (policy, coordinator, _) = setup();
        let identity = anon("fp-1", "1.2.3.4");

        let status = policy.evaluate(&identity).await.unwrap();
        assert_eq!((status.can_generate, status.used, status.remaining), (true, 0, 3));

        for used in 1..=3 {
            let status = coordinator.increment(&identity, 1).await.unwrap();
            assert_eq!(status.used, used);
        }

        let status = policy.evaluate(&identity).await.unwrap();
        assert_eq!(
            (status.can_generate, status.used, status.remaining),
            (false, 3, 0)
        );
    }

    #[tokio::test]
    async fn test_premium_increment_is_a_noop() {
        let (_, coordinator, store) = setup();
        let identity = QuotaIdentity::Authenticated {
            user_id: "user-1".to_string(),
            premium: PremiumStatus::lifetime(),
        };

        let status = coordinator.increment(&identity, 1).await.unwrap();
        assert!(status.is_unlimited());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_enforcement_is_a_noop() {
        let store = InMemoryLedger::new();
        let coordinator =
            IncrementCoordinator::new(QuotaConfig::disabled(), Arc::new(store.clone()));

        let status = coordinator.increment(&anon("fp-1", "1.2.3.4"), 1).await.unwrap();
        assert!(status.is_unlimited());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_anonymous_standing_reflects_ip_aggregate() {
        let (policy, coordinator, _) = setup();
        let first = anon("fp-1", "1.2.3.4");
        let second = anon("fp-2", "1.2.3.4");

        policy.evaluate(&first).await.unwrap();
        policy.evaluate(&second).await.unwrap();

        coordinator.increment(&first, 1).await.unwrap();
        coordinator.increment(&first, 1).await.unwrap();

        // fp-2's own row is untouched, yet its reported standing carries
        // the shared usage.
        let status = coordinator.increment(&second, 1).await.unwrap();
        assert_eq!(status.used, 3);
        assert!(!status.can_generate);
    }

    #[tokio::test]
    async fn test_registered_user_standing() {
        let (policy, coordinator, _) = setup();
        let identity = QuotaIdentity::Authenticated {
            user_id: "user-1".to_string(),
            premium: PremiumStatus::none(),
        };

        policy.evaluate(&identity).await.unwrap();
        let status = coordinator.increment(&identity, 1).await.unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, 9);
    }

    #[tokio::test]
    async fn test_amount_is_respected() {
        let (policy, coordinator, _) = setup();
        let identity = anon("fp-1", "1.2.3.4");

        policy.evaluate(&identity).await.unwrap();
        let status = coordinator.increment(&identity, 2).await.unwrap();
        assert_eq!(status.used, 2);
        assert_eq!(status.remaining, 1);
    }
}

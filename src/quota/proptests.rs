//! Property-based tests for quota accounting and period math

use proptest::prelude::*;

use super::config::PeriodKind;
use super::ledger::{InMemoryLedger, LedgerKey, LedgerStore};
use super::policy::QuotaStatus;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..20_000)
        .prop_map(|offset| NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(offset))
}

proptest! {
    #[test]
    fn status_within_is_coherent(used in 0u32..10_000, limit in 0u32..10_000) {
        let status = QuotaStatus::within(used, limit);
        prop_assert_eq!(status.can_generate, used < limit);
        prop_assert_eq!(status.used, used as i64);
        prop_assert_eq!(status.limit, limit as i64);
        prop_assert_eq!(status.remaining, limit.saturating_sub(used) as i64);
        prop_assert!(!status.is_unlimited());
    }

    #[test]
    fn daily_period_start_is_identity(date in arb_date()) {
        prop_assert_eq!(PeriodKind::Daily.start(date), date);
    }

    #[test]
    fn weekly_period_start_is_the_monday(date in arb_date()) {
        let start = PeriodKind::Weekly.start(date);
        prop_assert_eq!(start.weekday(), Weekday::Mon);
        prop_assert!(start <= date);
        prop_assert!((date - start).num_days() < 7);
        prop_assert_eq!(PeriodKind::Weekly.start(start), start);
    }

    #[test]
    fn ledger_key_roundtrips_through_json(
        fingerprint in "[a-f0-9]{16,64}",
        ip in any::<u32>(),
    ) {
        let key = LedgerKey::device(&fingerprint, std::net::IpAddr::V4(ip.into()));
        let json = serde_json::to_string(&key).unwrap();
        let parsed: LedgerKey = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, key);
    }

    #[test]
    fn increments_sum_regardless_of_interleaved_checks(
        amounts in proptest::collection::vec(1u32..4, 1..24),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let total: u32 = amounts.iter().sum();
        rt.block_on(async {
            let store = InMemoryLedger::new();
            let key = LedgerKey::device("fp-prop", "1.2.3.4".parse().unwrap());
            let today = chrono::Utc::now().date_naive();

            store.open_period(&key, today).await.unwrap();
            for amount in &amounts {
                // Re-opening the period between increments must not reset
                // or duplicate anything.
                store.open_period(&key, today).await.unwrap();
                store.increment(&key, today, *amount).await.unwrap();
            }

            let entry = store.get(&key).await.unwrap().unwrap();
            assert_eq!(entry.used_count, total);
            assert_eq!(store.count().await, 1);
        });
    }
}

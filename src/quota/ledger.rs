//! Usage Ledger
//!
//! Persistent per-identity, per-period usage rows and the store seam the
//! quota engine runs against. The shipped store is in-memory; a
//! database-backed store implements the same trait with `open_period` as an
//! upsert and `increment` as a single conditional UPDATE.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Quota engine errors
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Increment targeted a row that was never opened for the period.
    /// Signals a check/increment ordering bug upstream; never repaired
    /// silently.
    #[error("no quota row for {identity} in period {period}")]
    NoQuotaRecord {
        identity: String,
        period: NaiveDate,
    },

    /// Backing store failure (connection loss, serialization, ...)
    #[error("ledger store failure: {0}")]
    Store(String),
}

/// Key identifying the owner of a usage row
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum LedgerKey {
    /// Registered user, keyed by user id
    User { user_id: String },

    /// Anonymous device, keyed by fingerprint and client IP together.
    /// Both factors are part of the key: changing either addresses a
    /// different row, while the IP half still ties rows together for the
    /// aggregate check.
    Device { fingerprint: String, ip: IpAddr },
}

impl LedgerKey {
    /// Key for a registered user's quota row
    pub fn user(user_id: &str) -> Self {
        Self::User {
            user_id: user_id.to_string(),
        }
    }

    /// Key for an anonymous device's quota row
    pub fn device(fingerprint: &str, ip: IpAddr) -> Self {
        Self::Device {
            fingerprint: fingerprint.to_string(),
            ip,
        }
    }

    /// IP component, present only for device keys
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::User { .. } => None,
            Self::Device { ip, .. } => Some(*ip),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { user_id } => write!(f, "user:{user_id}"),
            Self::Device { fingerprint, ip } => write!(f, "device:{fingerprint}@{ip}"),
        }
    }
}

/// One usage row: how much an identity consumed within one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Row owner
    pub key: LedgerKey,

    /// Start date of the period the counter applies to (UTC)
    pub period_date: NaiveDate,

    /// Units consumed within the period
    pub used_count: u32,

    /// Last successful consumption
    pub last_used_at: Option<DateTime<Utc>>,

    /// Row creation time
    pub created_at: DateTime<Utc>,

    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn fresh(key: LedgerKey, period: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            key,
            period_date: period,
            used_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage seam for usage rows.
///
/// Implementations must make `open_period` an upsert (two concurrent
/// first-time calls yield one row) and `increment` an atomic conditional
/// update (concurrent increments serialize without lost updates).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Return the row for `(key, period)`, creating or rolling it forward
    /// as needed:
    /// - no row → insert a zero row for `period`;
    /// - row with an older period → reset the counter to 0 and advance
    ///   `period_date` in place (one row per identity, no growth);
    /// - row already on `period` → return unchanged.
    ///
    /// Idempotent: repeated calls neither duplicate rows nor touch the
    /// counter.
    async fn open_period(&self, key: &LedgerKey, period: NaiveDate)
        -> Result<LedgerEntry, QuotaError>;

    /// Add `amount` to the row for `(key, period)`.
    ///
    /// Fails with [`QuotaError::NoQuotaRecord`] when no row is on `period`,
    /// including a row stuck on an older period. Never creates rows.
    async fn increment(
        &self,
        key: &LedgerKey,
        period: NaiveDate,
        amount: u32,
    ) -> Result<LedgerEntry, QuotaError>;

    /// Sum of `used_count` over all device rows sharing `ip` within
    /// `period`. User rows never contribute.
    async fn used_by_ip(&self, ip: IpAddr, period: NaiveDate) -> Result<u32, QuotaError>;

    /// Fetch a row without side effects
    async fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, QuotaError>;

    /// Administrative reset: zero the row's counter, keeping its period.
    /// Returns whether a row existed.
    async fn reset(&self, key: &LedgerKey) -> Result<bool, QuotaError>;

    /// Retention cleanup: drop rows whose period predates `cutoff`.
    /// Returns the number of rows removed.
    async fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, QuotaError>;
}

/// In-memory ledger store
///
/// Keeps exactly one row per identity and rolls it forward across periods.
/// Every mutation runs under the write lock, which is what makes the
/// trait's atomicity contract hold here.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    rows: Arc<RwLock<HashMap<LedgerKey, LedgerEntry>>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held
    pub async fn count(&self) -> usize {
        let rows = self.rows.read().await;
        rows.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn open_period(
        &self,
        key: &LedgerKey,
        period: NaiveDate,
    ) -> Result<LedgerEntry, QuotaError> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();

        let entry = rows
            .entry(key.clone())
            .or_insert_with(|| LedgerEntry::fresh(key.clone(), period, now));

        // Roll forward only; a row already on a later period stays put.
        if entry.period_date < period {
            entry.period_date = period;
            entry.used_count = 0;
            entry.updated_at = now;
        }

        Ok(entry.clone())
    }

    async fn increment(
        &self,
        key: &LedgerKey,
        period: NaiveDate,
        amount: u32,
    ) -> Result<LedgerEntry, QuotaError> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();

        match rows.get_mut(key) {
            Some(entry) if entry.period_date == period => {
                entry.used_count += amount;
                entry.last_used_at = Some(now);
                entry.updated_at = now;
                Ok(entry.clone())
            }
            _ => Err(QuotaError::NoQuotaRecord {
                identity: key.to_string(),
                period,
            }),
        }
    }

    async fn used_by_ip(&self, ip: IpAddr, period: NaiveDate) -> Result<u32, QuotaError> {
        let rows = self.rows.read().await;
        let total = rows
            .values()
            .filter(|e| e.period_date == period && e.key.ip() == Some(ip))
            .map(|e| e.used_count)
            .sum();
        Ok(total)
    }

    async fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, QuotaError> {
        let rows = self.rows.read().await;
        Ok(rows.get(key).cloned())
    }

    async fn reset(&self, key: &LedgerKey) -> Result<bool, QuotaError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(key) {
            Some(entry) => {
                entry.used_count = 0;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, QuotaError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, e| e.period_date >= cutoff);
        Ok(before - rows.len())
    }
}

//! Quota Configuration
//!
//! Tunables for generation quota enforcement.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default quota limits
pub const DEFAULT_ANONYMOUS_DAILY_LIMIT: u32 = 3; // free generations per IP per day
pub const DEFAULT_USER_LIMIT: u32 = 10; // free generations per registered user per period
pub const DEFAULT_RETENTION_DAYS: i64 = 90; // ledger rows older than this are purgeable

/// Period granularity for registered-user quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// One UTC calendar day
    #[default]
    Daily,
    /// One UTC ISO week, starting Monday
    Weekly,
}

impl PeriodKind {
    /// Start date of the period containing `date`.
    pub fn start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            PeriodKind::Daily => date,
            PeriodKind::Weekly => {
                let days = date.weekday().num_days_from_monday() as i64;
                date - Duration::days(days)
            }
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Enable quota enforcement
    pub enabled: bool,

    /// Free generations per IP per UTC day for anonymous devices
    pub anonymous_daily_limit: u32,

    /// Free generations per registered (non-premium) user per period
    pub user_limit: u32,

    /// Period granularity for registered users
    #[serde(default)]
    pub user_period: PeriodKind,

    /// Ledger rows whose period predates today by more than this are purgeable
    pub retention_days: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymous_daily_limit: DEFAULT_ANONYMOUS_DAILY_LIMIT,
            user_limit: DEFAULT_USER_LIMIT,
            user_period: PeriodKind::Daily,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl QuotaConfig {
    /// Create a new quota configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TRYON_QUOTA_ENABLED") {
            config.enabled = val.parse().unwrap_or(true);
        }

        if let Ok(val) = std::env::var("TRYON_ANON_DAILY_LIMIT") {
            if let Ok(limit) = val.parse() {
                config.anonymous_daily_limit = limit;
            }
        }

        if let Ok(val) = std::env::var("TRYON_USER_LIMIT") {
            if let Ok(limit) = val.parse() {
                config.user_limit = limit;
            }
        }

        if let Ok(val) = std::env::var("TRYON_USER_PERIOD") {
            match val.to_lowercase().as_str() {
                "weekly" => config.user_period = PeriodKind::Weekly,
                "daily" => config.user_period = PeriodKind::Daily,
                _ => {}
            }
        }

        if let Ok(val) = std::env::var("TRYON_QUOTA_RETENTION_DAYS") {
            if let Ok(days) = val.parse() {
                config.retention_days = days;
            }
        }

        config
    }

    /// Disable quota enforcement (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

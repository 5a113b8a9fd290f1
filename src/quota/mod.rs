//! Quota Engine
//!
//! Per-identity, per-period metering of free try-on generations. The
//! read side (policy) decides whether a request may proceed; the write
//! side (coordinator) consumes a unit only after the vendor reported at
//! least one successful result.
//!
//! # Features
//!
//! - Multi-factor anonymous identity (device fingerprint + client IP)
//! - IP-wide aggregation so fingerprint churn cannot mint allowance
//! - In-place period rollover (one ledger row per identity)
//! - Premium bypass and a disabled mode for tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Identity Resolver                         │
//! │        bearer token ─► user     fingerprint+IP ─► device    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐      ┌─────────────────────────┐   │
//! │  │ Quota Policy (read) │      │ Increment Coordinator   │   │
//! │  │ evaluate()          │      │ (write, post-success)   │   │
//! │  └─────────────────────┘      └─────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Ledger Store (in-memory / database)          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod identity;
pub mod ledger;
pub mod policy;

#[cfg(test)]
mod proptests;

pub use config::{PeriodKind, QuotaConfig};
pub use coordinator::IncrementCoordinator;
pub use identity::{IdentityResolver, PremiumStatus, QuotaIdentity, RequestContext};
pub use ledger::{InMemoryLedger, LedgerEntry, LedgerKey, LedgerStore, QuotaError};
pub use policy::{QuotaPolicy, QuotaStatus, UNLIMITED};

//! Error Taxonomy
//!
//! Request-level errors with stable client-facing codes. Per-item vendor
//! failures never appear here: they stay inside the result envelope so one
//! bad image cannot sink a batch. Best-effort steps (audit writes, storage
//! uploads) log and continue instead of erroring.

use crate::auth::AuthError;
use crate::quota::{QuotaError, QuotaStatus};

/// Errors that abort a generation request at or before the quota gate
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    /// Registered user has no free generations left for the period
    #[error("free generation limit reached")]
    LimitExceeded(QuotaStatus),

    /// Anonymous device/IP has no free generations left for the day
    #[error("free generation limit reached for this device")]
    AnonLimitExceeded(QuotaStatus),

    /// Anonymous request missing the fingerprint or the client IP
    #[error("device fingerprint and client IP are required")]
    DeviceFingerprintRequired,

    /// Batch contained no usable person image
    #[error("no valid input images")]
    NoValidInput,

    /// Quota engine failure (store error or ordering violation)
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// Auth backend failure (distinct from an invalid token)
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl TryOnError {
    /// Stable machine-readable code for the client surface
    pub fn code(&self) -> &'static str {
        match self {
            Self::LimitExceeded(_) => "LIMIT_EXCEEDED",
            Self::AnonLimitExceeded(_) => "ANON_LIMIT_EXCEEDED",
            Self::DeviceFingerprintRequired => "DEVICE_FINGERPRINT_REQUIRED",
            Self::NoValidInput => "NO_VALID_INPUT",
            Self::Quota(_) | Self::Auth(_) => "INTERNAL_ERROR",
        }
    }

    /// The denied standing, for errors that carry one
    pub fn quota_status(&self) -> Option<QuotaStatus> {
        match self {
            Self::LimitExceeded(status) | Self::AnonLimitExceeded(status) => Some(*status),
            _ => None,
        }
    }
}

//! Result Envelope
//!
//! Wire shapes for one generation request and its response. The envelope
//! is deliberately forgiving: per-item vendor failures ride inside
//! `results[]`, and `success` stays `true` as long as the request itself
//! was admitted. Only quota-gate and input-validation failures surface as
//! request errors.

use serde::{Deserialize, Serialize};

use super::vendor::GarmentCategory;
use crate::quota::QuotaStatus;

/// One person photo in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonImage {
    /// Caller-side name, echoed back as `original` in the outcome
    pub name: String,

    /// URL the vendor fetches the photo from
    pub url: String,

    /// Local path for pre-flight validation; `None` skips the file check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PersonImage {
    /// Image addressed by URL only (no local file to validate)
    pub fn remote(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            path: None,
        }
    }

    /// Image backed by a local file that must exist and be non-empty
    pub fn local(name: &str, url: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            path: Some(path.to_string()),
        }
    }
}

/// One try-on batch: several person photos against one garment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub person_images: Vec<PersonImage>,
    pub garment_url: String,
    pub category: GarmentCategory,
}

/// Outcome of one person photo within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// The `name` of the input image this outcome belongs to
    pub original: String,

    /// Per-item success flag
    pub success: bool,

    /// Result location: permanent-storage URL when the upload worked,
    /// otherwise the vendor's short-lived URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Per-item failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the permanent-storage upload failed and the result URL
    /// still points at the vendor; the sweep will move it later
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub storage_pending: bool,
}

impl ItemOutcome {
    /// Successful item stored at `result_url`
    pub fn completed(original: &str, result_url: &str) -> Self {
        Self {
            original: original.to_string(),
            success: true,
            result_url: Some(result_url.to_string()),
            error: None,
            storage_pending: false,
        }
    }

    /// Failed item with a per-item error message
    pub fn failed(original: &str, error: &str) -> Self {
        Self {
            original: original.to_string(),
            success: false,
            result_url: None,
            error: Some(error.to_string()),
            storage_pending: false,
        }
    }
}

/// Response envelope for one generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// `true` for every admitted request, including all-items-failed
    /// batches; per-item state lives in `results`
    pub success: bool,

    /// One outcome per valid input image, input order preserved
    pub results: Vec<ItemOutcome>,

    /// Quota standing after the batch
    pub daily_limit: QuotaStatus,
}

impl GenerationResponse {
    /// Number of successful items
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

//! Generation Orchestrator
//!
//! Sequences one try-on batch through its states:
//!
//! ```text
//! CHECKING → VALIDATING_INPUT → GENERATING → INCREMENTING → AUDITING → DONE
//! ```
//!
//! The ordering carries the quota contract: evaluation happens before any
//! vendor call, and exactly one unit is consumed after the vendor reported
//! at least one success. A batch where every item fails returns a normal
//! envelope full of error entries and leaves the ledger untouched; the
//! user never pays for a vendor outage. Audit writes and storage uploads
//! run after the increment and are best-effort: they log, flag, and queue,
//! never fail the request.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::audit::{AuditRecord, AuditStore};
use super::envelope::{GenerationRequest, GenerationResponse, ItemOutcome, PersonImage};
use super::poller::{poll_to_completion, PollPolicy};
use super::vendor::{GarmentCategory, GenerationVendor, VendorError};
use crate::error::TryOnError;
use crate::metrics;
use crate::quota::{
    IdentityResolver, IncrementCoordinator, QuotaIdentity, QuotaPolicy, QuotaStatus,
    RequestContext,
};
use crate::storage::{ObjectStorage, PendingUpload, UploadQueue};

/// Driver for one generation request
pub struct GenerationOrchestrator {
    resolver: IdentityResolver,
    policy: QuotaPolicy,
    coordinator: IncrementCoordinator,
    vendor: Arc<dyn GenerationVendor>,
    poll_policy: PollPolicy,
    audit: Arc<dyn AuditStore>,
    storage: Arc<dyn ObjectStorage>,
    upload_queue: UploadQueue,
}

impl GenerationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: IdentityResolver,
        policy: QuotaPolicy,
        coordinator: IncrementCoordinator,
        vendor: Arc<dyn GenerationVendor>,
        poll_policy: PollPolicy,
        audit: Arc<dyn AuditStore>,
        storage: Arc<dyn ObjectStorage>,
        upload_queue: UploadQueue,
    ) -> Self {
        Self {
            resolver,
            policy,
            coordinator,
            vendor,
            poll_policy,
            audit,
            storage,
            upload_queue,
        }
    }

    /// Run one batch end to end.
    ///
    /// Precondition failures (`LIMIT_EXCEEDED`, `ANON_LIMIT_EXCEEDED`,
    /// `DEVICE_FINGERPRINT_REQUIRED`, `NO_VALID_INPUT`) return `Err` with
    /// nothing attempted. Everything past the input check degrades into
    /// the success envelope with per-item error entries.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, TryOnError> {
        // CHECKING
        let identity = self.resolver.resolve(ctx).await?;
        let status = self.policy.evaluate(&identity).await?;
        if !status.can_generate {
            metrics::QUOTA_DENIALS_TOTAL
                .with_label_values(&[identity_class(&identity)])
                .inc();
            info!(identity = %identity.ledger_key(), used = status.used, "generation denied");
            return Err(denial(&identity, status));
        }

        // VALIDATING_INPUT
        let valid = validate_inputs(&request.person_images).await;
        if valid.is_empty() {
            return Err(TryOnError::NoValidInput);
        }

        // GENERATING: one vendor round per image, concurrently; items
        // never abort each other.
        let timer = metrics::GENERATION_DURATION_SECONDS.start_timer();
        let item_results = self.generate_all(&valid, &request).await;

        // INCREMENTING: one unit per batch, only if something succeeded.
        let any_success = item_results.iter().any(|r| r.is_ok());
        let status = if any_success {
            self.coordinator.increment(&identity, 1).await?
        } else {
            status
        };

        // AUDITING + DONE
        let results = self
            .audit_and_persist(&identity, &request, &valid, item_results)
            .await;

        timer.observe_duration();
        Ok(GenerationResponse {
            success: true,
            results,
            daily_limit: status,
        })
    }

    async fn generate_all(
        &self,
        images: &[PersonImage],
        request: &GenerationRequest,
    ) -> Vec<Result<(String, Bytes), VendorError>> {
        let mut handles = Vec::with_capacity(images.len());
        for image in images {
            let vendor = Arc::clone(&self.vendor);
            let poll_policy = self.poll_policy;
            let image = image.clone();
            let garment_url = request.garment_url.clone();
            let category = request.category;
            handles.push(tokio::spawn(async move {
                generate_one(vendor.as_ref(), &image, &garment_url, category, &poll_policy).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(error = %e, "generation task panicked");
                    results.push(Err(VendorError::Api {
                        status: 500,
                        message: "generation task aborted".to_string(),
                    }));
                }
            }
        }
        results
    }

    async fn audit_and_persist(
        &self,
        identity: &QuotaIdentity,
        request: &GenerationRequest,
        images: &[PersonImage],
        item_results: Vec<Result<(String, Bytes), VendorError>>,
    ) -> Vec<ItemOutcome> {
        let identity_key = identity.ledger_key().to_string();
        let mut outcomes = Vec::with_capacity(images.len());

        for (image, result) in images.iter().zip(item_results) {
            let mut record = AuditRecord::pending(
                &identity_key,
                request.category,
                &image.url,
                &request.garment_url,
            );

            let outcome = match result {
                Ok((vendor_url, bytes)) => {
                    metrics::GENERATION_ITEMS_TOTAL
                        .with_label_values(&["completed"])
                        .inc();
                    let outcome = self
                        .persist_result(&record.id, &image.name, &vendor_url, bytes)
                        .await;
                    record.complete(outcome.result_url.as_deref().unwrap_or(&vendor_url));
                    outcome
                }
                Err(e) => {
                    metrics::GENERATION_ITEMS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    debug!(original = %image.name, error = %e, "generation item failed");
                    record.fail(&e.to_string());
                    ItemOutcome::failed(&image.name, &e.to_string())
                }
            };

            if let Err(e) = self.audit.record(record).await {
                warn!(original = %image.name, error = %e, "audit write failed");
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Copy a finished result into permanent storage.
    ///
    /// On upload failure the item keeps the vendor's short-lived URL, gets
    /// flagged `storage_pending`, and a queue entry hands the copy to the
    /// sweep.
    async fn persist_result(
        &self,
        record_id: &str,
        original: &str,
        vendor_url: &str,
        bytes: Bytes,
    ) -> ItemOutcome {
        let object_key = format!("results/{record_id}.png");
        match self.storage.upload(&object_key, bytes).await {
            Ok(public_url) => ItemOutcome::completed(original, &public_url),
            Err(e) => {
                metrics::STORAGE_UPLOAD_FAILURES_TOTAL.inc();
                warn!(
                    %original,
                    key = %object_key,
                    error = %e,
                    "permanent storage upload failed, queued for sweep"
                );
                self.upload_queue
                    .enqueue(PendingUpload::new(&object_key, vendor_url, &e.to_string()))
                    .await;
                let mut outcome = ItemOutcome::completed(original, vendor_url);
                outcome.storage_pending = true;
                outcome
            }
        }
    }
}

/// One item's vendor round: submit, poll to terminal, download
async fn generate_one(
    vendor: &dyn GenerationVendor,
    image: &PersonImage,
    garment_url: &str,
    category: GarmentCategory,
    poll_policy: &PollPolicy,
) -> Result<(String, Bytes), VendorError> {
    let task = vendor.submit(&image.url, garment_url, category).await?;
    let result_url = poll_to_completion(vendor, &task, poll_policy).await?;
    let bytes = vendor.download(&result_url).await?;
    Ok((result_url, bytes))
}

/// Keep images whose backing file (when given) exists and is non-empty
async fn validate_inputs(images: &[PersonImage]) -> Vec<PersonImage> {
    let mut valid = Vec::with_capacity(images.len());
    for image in images {
        match &image.path {
            None => valid.push(image.clone()),
            Some(path) => match tokio::fs::metadata(path).await {
                Ok(meta) if meta.len() > 0 => valid.push(image.clone()),
                Ok(_) => warn!(original = %image.name, %path, "skipping empty input image"),
                Err(e) => {
                    warn!(original = %image.name, %path, error = %e, "skipping unreadable input image")
                }
            },
        }
    }
    valid
}

fn identity_class(identity: &QuotaIdentity) -> &'static str {
    if identity.is_anonymous() {
        "anonymous"
    } else {
        "user"
    }
}

fn denial(identity: &QuotaIdentity, status: QuotaStatus) -> TryOnError {
    if identity.is_anonymous() {
        TryOnError::AnonLimitExceeded(status)
    } else {
        TryOnError::LimitExceeded(status)
    }
}

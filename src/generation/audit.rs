//! Generation Audit Trail
//!
//! One record per attempted generation item, written after the vendor call
//! resolved. The trail is history, not accounting: the quota ledger counts
//! usage, this records what happened. Writes are best-effort at the call
//! site; an audit failure never fails the request that produced it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::vendor::GarmentCategory;

/// Audit store errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit store failure: {0}")]
    Store(String),
}

/// Terminal outcome of one generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    /// Submitted, not yet resolved
    Pending,
    /// Vendor produced a result
    Completed,
    /// Vendor failed, timed out, or returned nothing usable
    Failed,
}

/// One generation attempt, as recorded for admins and history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record ID
    pub id: String,
    /// Display form of the identity's ledger key
    pub identity: String,
    /// Garment slot that was requested
    pub category: GarmentCategory,
    /// Person image reference
    pub person_url: String,
    /// Garment image reference
    pub garment_url: String,
    /// Result location, when the attempt completed
    pub result_url: Option<String>,
    /// Attempt outcome
    pub status: GenerationStatus,
    /// Failure description for failed attempts
    pub error: Option<String>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Resolution time
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// Record for a freshly submitted attempt
    pub fn pending(
        identity: &str,
        category: GarmentCategory,
        person_url: &str,
        garment_url: &str,
    ) -> Self {
        Self {
            id: format!("gen-{}", Uuid::new_v4()),
            identity: identity.to_string(),
            category,
            person_url: person_url.to_string(),
            garment_url: garment_url.to_string(),
            result_url: None,
            status: GenerationStatus::Pending,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark the attempt completed with its result location
    pub fn complete(&mut self, result_url: &str) {
        self.status = GenerationStatus::Completed;
        self.result_url = Some(result_url.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the attempt failed
    pub fn fail(&mut self, error: &str) {
        self.status = GenerationStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }
}

/// Aggregate counts over the trail
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Storage seam for the audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a record, replacing any previous write under the same id
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// All records for one identity, most recent first
    async fn for_identity(&self, identity: &str) -> Result<Vec<AuditRecord>, AuditError>;

    /// Aggregate counts
    async fn stats(&self) -> Result<AuditStats, AuditError>;
}

/// In-memory audit store
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<HashMap<String, AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn for_identity(&self, identity: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.read().await;
        let mut matching: Vec<AuditRecord> = records
            .values()
            .filter(|r| r.identity == identity)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn stats(&self) -> Result<AuditStats, AuditError> {
        let records = self.records.read().await;
        let mut stats = AuditStats {
            total: records.len(),
            ..Default::default()
        };
        for record in records.values() {
            match record.status {
                GenerationStatus::Completed => stats.completed += 1,
                GenerationStatus::Failed => stats.failed += 1,
                GenerationStatus::Pending => {}
            }
        }
        Ok(stats)
    }
}

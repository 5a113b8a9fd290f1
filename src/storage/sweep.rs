//! Upload Retry Sweep
//!
//! Results whose permanent-storage upload failed are queued here and
//! recovered by an out-of-band batch job: re-download the bytes from the
//! vendor URL, re-upload under the original object key. The key is stable,
//! so a sweep pass that races a duplicate entry or a repeated run simply
//! overwrites the same object. Entries that exhaust their attempt budget
//! are dropped with an error log; by then the vendor URL has expired and
//! the entry would sit in the queue forever.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::object_store::{ObjectStorage, StorageError};
use crate::metrics;

/// One queued upload awaiting recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Unique queue entry ID
    pub id: String,
    /// Object key the result belongs under; stable across retries
    pub object_key: String,
    /// Short-lived vendor URL to re-download from
    pub source_url: String,
    /// Sweep attempts made so far
    pub attempts: u32,
    /// Last failure seen
    pub last_error: Option<String>,
    /// When the upload first failed
    pub queued_at: DateTime<Utc>,
}

impl PendingUpload {
    pub fn new(object_key: &str, source_url: &str, last_error: &str) -> Self {
        Self {
            id: format!("upl-{}", Uuid::new_v4()),
            object_key: object_key.to_string(),
            source_url: source_url.to_string(),
            attempts: 0,
            last_error: Some(last_error.to_string()),
            queued_at: Utc::now(),
        }
    }
}

/// Queue of failed uploads shared between the orchestrator and the sweeper
#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    entries: Arc<RwLock<HashMap<String, PendingUpload>>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the queue
    pub async fn enqueue(&self, entry: PendingUpload) -> String {
        let id = entry.id.clone();
        let mut entries = self.entries.write().await;
        entries.insert(id.clone(), entry);
        id
    }

    /// Snapshot of all queued entries
    pub async fn entries(&self) -> Vec<PendingUpload> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    /// Number of queued entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn remove(&self, id: &str) -> Option<PendingUpload> {
        let mut entries = self.entries.write().await;
        entries.remove(id)
    }

    async fn record_failure(&self, id: &str, error: &str) -> Option<u32> {
        let mut entries = self.entries.write().await;
        entries.get_mut(id).map(|entry| {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
            entry.attempts
        })
    }
}

/// Seam for re-downloading result bytes from a vendor URL
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, StorageError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, StorageError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Gateway {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?)
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Entries the pass looked at
    pub attempted: usize,
    /// Entries recovered into permanent storage
    pub recovered: usize,
    /// Entries dropped after exhausting the attempt budget
    pub dropped: usize,
    /// Entries left queued for a later pass
    pub retained: usize,
}

/// Out-of-band recovery job for queued uploads
pub struct UploadSweeper {
    queue: UploadQueue,
    storage: Arc<dyn ObjectStorage>,
    fetcher: Arc<dyn ResultFetcher>,
    max_attempts: u32,
}

impl UploadSweeper {
    pub fn new(
        queue: UploadQueue,
        storage: Arc<dyn ObjectStorage>,
        fetcher: Arc<dyn ResultFetcher>,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            storage,
            fetcher,
            max_attempts,
        }
    }

    /// Run one sweep pass over the current queue snapshot.
    ///
    /// Idempotent: recovered entries leave the queue, and re-uploading
    /// under the stable object key overwrites rather than duplicates.
    pub async fn run_once(&self) -> SweepReport {
        let snapshot = self.queue.entries().await;
        let mut report = SweepReport {
            attempted: snapshot.len(),
            ..Default::default()
        };

        for entry in snapshot {
            match self.recover(&entry).await {
                Ok(url) => {
                    self.queue.remove(&entry.id).await;
                    metrics::STORAGE_UPLOAD_RECOVERIES_TOTAL.inc();
                    report.recovered += 1;
                    info!(id = %entry.id, key = %entry.object_key, %url, "upload recovered");
                }
                Err(e) => {
                    let attempts = self
                        .queue
                        .record_failure(&entry.id, &e.to_string())
                        .await
                        .unwrap_or(entry.attempts + 1);
                    if attempts >= self.max_attempts {
                        self.queue.remove(&entry.id).await;
                        report.dropped += 1;
                        error!(
                            id = %entry.id,
                            key = %entry.object_key,
                            attempts,
                            error = %e,
                            "upload dropped after exhausting attempts"
                        );
                    } else {
                        report.retained += 1;
                        warn!(
                            id = %entry.id,
                            key = %entry.object_key,
                            attempts,
                            error = %e,
                            "upload still failing, retained for next sweep"
                        );
                    }
                }
            }
        }

        report
    }

    async fn recover(&self, entry: &PendingUpload) -> Result<String, StorageError> {
        let bytes = self.fetcher.fetch(&entry.source_url).await?;
        self.storage.upload(&entry.object_key, bytes).await
    }
}

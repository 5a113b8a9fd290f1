//! Permanent Object Storage
//!
//! Vendor result URLs expire; anything the user should keep gets copied
//! into permanent storage. Uploads are best-effort at every call site:
//! a failure is logged, flagged on the item, and queued for the sweep,
//! never propagated as a request error.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Storage collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transport failure (connect, timeout, decode)
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the gateway
    #[error("storage gateway returned status {status}: {message}")]
    Gateway { status: u16, message: String },

    /// Local filesystem failure
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage seam
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return the public URL.
    ///
    /// Keys are stable per result item, so a retried upload overwrites its
    /// own earlier attempt rather than creating a sibling.
    async fn upload(&self, key: &str, bytes: Bytes) -> Result<String, StorageError>;
}

/// HTTP gateway client for an S3-style object store
///
/// PUTs object bytes to `<base_url>/<key>` with bearer auth and maps the
/// key to `<public_base>/<key>` on success.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    public_base: String,
    api_key: String,
}

impl HttpObjectStorage {
    pub fn new(
        base_url: impl Into<String>,
        public_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Public URL an uploaded key is served from
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, key: &str, bytes: Bytes) -> Result<String, StorageError> {
        let url = format!("{}/{}", self.base_url, key);
        debug!(%url, size = bytes.len(), "uploading object");

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        Ok(self.public_url(key))
    }
}

/// Directory-backed storage for the CLI and single-node setups
pub struct LocalDirStorage {
    root: PathBuf,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for LocalDirStorage {
    async fn upload(&self, key: &str, bytes: Bytes) -> Result<String, StorageError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}

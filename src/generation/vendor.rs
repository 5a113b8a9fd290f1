//! Generation Vendor
//!
//! Client seam for the third-party try-on API. The contract is
//! submit/poll/download: submitting returns a task handle, the task
//! eventually reaches a terminal state, and a finished task exposes a
//! short-lived result URL. Poll cadence and the attempt budget are owned
//! by the caller ([`poll_to_completion`](super::poller::poll_to_completion)),
//! not by this client.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Vendor-call failures; always isolated to the item that hit them
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    /// Transport failure (connect, timeout, decode)
    #[error("vendor request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the vendor API
    #[error("vendor returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Task reached the failed state
    #[error("task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    /// Task did not reach a terminal state within the poll budget
    #[error("task {task_id} not finished after {attempts} polls")]
    PollTimeout { task_id: String, attempts: u32 },

    /// Terminal response carried no result URL
    #[error("task {task_id} finished without a result url")]
    MissingResult { task_id: String },
}

/// Garment slot the vendor should dress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentCategory {
    UpperBody,
    LowerBody,
    Dress,
}

impl GarmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpperBody => "upper_body",
            Self::LowerBody => "lower_body",
            Self::Dress => "dress",
        }
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GarmentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upper_body" | "upper-body" | "top" => Ok(Self::UpperBody),
            "lower_body" | "lower-body" | "bottom" => Ok(Self::LowerBody),
            "dress" | "dresses" => Ok(Self::Dress),
            other => Err(format!("unknown garment category: {other}")),
        }
    }
}

/// Handle to a submitted vendor task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Task lifecycle as reported by the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl TaskState {
    /// Whether the state can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPoll {
    pub status: TaskState,

    /// Present once `status` is `done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Present once `status` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Vendor API seam
#[async_trait]
pub trait GenerationVendor: Send + Sync {
    /// Submit one try-on task for a person/garment pair
    async fn submit(
        &self,
        person_url: &str,
        garment_url: &str,
        category: GarmentCategory,
    ) -> Result<TaskHandle, VendorError>;

    /// Poll a task's state
    async fn poll(&self, task: &TaskHandle) -> Result<TaskPoll, VendorError>;

    /// Download a finished result
    async fn download(&self, url: &str) -> Result<Bytes, VendorError>;
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    person_image_url: &'a str,
    garment_image_url: &'a str,
    category: &'a str,
}

/// HTTP client against the vendor's task API
///
/// - **base_url**: API root, e.g. `https://api.vendor.example`
/// - **api_key**: sent as a bearer token on every call
/// - **timeout**: per-request timeout (default: 30 seconds)
pub struct HttpVendorClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpVendorClient {
    /// Create a client for the given API root
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let timeout = Duration::from_secs(30);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to rebuild HTTP client");
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn tasks_url(&self) -> String {
        format!("{}/v1/tryon/tasks", self.base_url)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/v1/tryon/tasks/{task_id}", self.base_url)
    }

    async fn ok_or_api_error(response: reqwest::Response) -> Result<reqwest::Response, VendorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(VendorError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl GenerationVendor for HttpVendorClient {
    async fn submit(
        &self,
        person_url: &str,
        garment_url: &str,
        category: GarmentCategory,
    ) -> Result<TaskHandle, VendorError> {
        let body = SubmitRequest {
            person_image_url: person_url,
            garment_image_url: garment_url,
            category: category.as_str(),
        };

        debug!(url = %self.tasks_url(), %category, "submitting try-on task");

        let response = self
            .client
            .post(self.tasks_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ok_or_api_error(response).await?;
        Ok(response.json::<TaskHandle>().await?)
    }

    async fn poll(&self, task: &TaskHandle) -> Result<TaskPoll, VendorError> {
        let response = self
            .client
            .get(self.task_url(&task.task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::ok_or_api_error(response).await?;
        Ok(response.json::<TaskPoll>().await?)
    }

    async fn download(&self, url: &str) -> Result<Bytes, VendorError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ok_or_api_error(response).await?;
        Ok(response.bytes().await?)
    }
}

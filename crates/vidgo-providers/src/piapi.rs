//! PiAPI client.
//!
//! PiAPI fronts several generation models behind a single task API:
//! create a task with `POST /api/v1/task`, then poll
//! `GET /api/v1/task/{task_id}` until it reaches a terminal status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vidgo_models::Capability;

use crate::client::{optional_str, require_str, ProviderClient, ProviderOutput, ProviderParams};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://api.piapi.ai";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_MAX_POLLS: u32 = 60;

/// PiAPI task client.
pub struct PiApiClient {
    api_key: String,
    base_url: String,
    http: Client,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    model: &'a str,
    task_type: &'a str,
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    code: i32,
    #[serde(default)]
    message: String,
    data: Option<TaskData>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    task_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<TaskOutput>,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    message: String,
}

impl PiApiClient {
    /// Create a client against the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint (tests, staging).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override the poll cadence (tests).
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Model and task type for a capability.
    fn task_spec(capability: Capability) -> ProviderResult<(&'static str, &'static str)> {
        match capability {
            Capability::TextToImage => Ok(("Qubico/flux1-dev", "txt2img")),
            Capability::ImageToVideo => Ok(("kling", "video_generation")),
            Capability::TextToVideo => Ok(("kling", "video_generation")),
            Capability::Interior => Ok(("Qubico/flux1-dev", "img2img")),
            Capability::BackgroundRemoval => Ok(("Qubico/image-toolkit", "background-remove")),
            other => Err(ProviderError::Unsupported(other)),
        }
    }

    /// Vendor-specific input payload for a capability.
    fn task_input(
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<serde_json::Value> {
        let input = match capability {
            Capability::TextToImage => serde_json::json!({
                "prompt": require_str(params, "prompt")?,
            }),
            Capability::ImageToVideo => serde_json::json!({
                "image_url": require_str(params, "image_url")?,
                "prompt": optional_str(params, "prompt").unwrap_or_default(),
            }),
            Capability::TextToVideo => serde_json::json!({
                "prompt": require_str(params, "prompt")?,
            }),
            Capability::Interior => serde_json::json!({
                "image_url": require_str(params, "image_url")?,
                "prompt": format!(
                    "Redesign this {} in {} style",
                    optional_str(params, "room_type").unwrap_or("room"),
                    optional_str(params, "style").unwrap_or("modern"),
                ),
            }),
            Capability::BackgroundRemoval => serde_json::json!({
                "image": require_str(params, "image_url")?,
            }),
            other => return Err(ProviderError::Unsupported(other)),
        };
        Ok(input)
    }

    async fn create_task(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<String> {
        let (model, task_type) = Self::task_spec(capability)?;
        let request = CreateTaskRequest {
            model,
            task_type,
            input: Self::task_input(capability, params)?,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/task", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let envelope: TaskEnvelope = response.json().await?;
        if envelope.code != 200 {
            return Err(ProviderError::TaskFailed(envelope.message));
        }

        envelope
            .data
            .map(|d| d.task_id)
            .ok_or_else(|| ProviderError::Malformed("missing task data".to_string()))
    }

    async fn poll_task(&self, task_id: &str) -> ProviderResult<ProviderOutput> {
        for _ in 0..self.max_polls {
            let response = self
                .http
                .get(format!("{}/api/v1/task/{}", self.base_url, task_id))
                .header("x-api-key", &self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status, body });
            }

            let envelope: TaskEnvelope = response.json().await?;
            let data = envelope
                .data
                .ok_or_else(|| ProviderError::Malformed("missing task data".to_string()))?;

            match data.status.as_str() {
                "completed" => {
                    let output = data
                        .output
                        .ok_or_else(|| ProviderError::Malformed("completed without output".to_string()))?;
                    let mut urls: Vec<String> = Vec::new();
                    if let Some(url) = output.image_url {
                        urls.push(url);
                    }
                    if let Some(url) = output.video_url {
                        urls.push(url);
                    }
                    urls.extend(output.image_urls);
                    if urls.is_empty() {
                        return Err(ProviderError::Malformed(
                            "completed task has no result URLs".to_string(),
                        ));
                    }
                    return Ok(ProviderOutput { result_urls: urls });
                }
                "failed" => {
                    let message = data
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown task error".to_string());
                    return Err(ProviderError::TaskFailed(message));
                }
                status => {
                    debug!(task_id = %task_id, status = %status, "PiAPI task pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ProviderError::PollExhausted(self.max_polls))
    }
}

#[async_trait]
impl ProviderClient for PiApiClient {
    fn name(&self) -> &'static str {
        "piapi"
    }

    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput> {
        let task_id = self.create_task(capability, params).await?;
        debug!(task_id = %task_id, capability = %capability, "PiAPI task created");
        self.poll_task(&task_id).await
    }
}

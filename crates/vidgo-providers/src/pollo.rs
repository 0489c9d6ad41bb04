//! Pollo AI client.
//!
//! Pollo exposes per-capability generation endpoints
//! (`POST /v1/generation/{t2v|i2v}`) returning a task id, polled via
//! `GET /v1/generation/{task_id}/status`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vidgo_models::Capability;

use crate::client::{optional_str, require_str, ProviderClient, ProviderOutput, ProviderParams};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://pollo.ai/api/platform";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLLS: u32 = 60;

/// Pollo video generation client.
pub struct PolloClient {
    api_key: String,
    base_url: String,
    http: Client,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    length: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl PolloClient {
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

    fn endpoint(capability: Capability) -> ProviderResult<&'static str> {
        match capability {
            Capability::TextToVideo => Ok("t2v"),
            Capability::ImageToVideo => Ok("i2v"),
            other => Err(ProviderError::Unsupported(other)),
        }
    }

    async fn poll_status(&self, task_id: &str) -> ProviderResult<ProviderOutput> {
        for _ in 0..self.max_polls {
            let response = self
                .http
                .get(format!("{}/v1/generation/{}/status", self.base_url, task_id))
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status, body });
            }

            let status: StatusResponse = response.json().await?;
            match status.status.as_str() {
                "succeed" | "succeeded" => {
                    let url = status.video_url.ok_or_else(|| {
                        ProviderError::Malformed("succeeded without videoUrl".to_string())
                    })?;
                    return Ok(ProviderOutput::single(url));
                }
                "failed" => {
                    return Err(ProviderError::TaskFailed(
                        status
                            .failure_reason
                            .unwrap_or_else(|| "unknown generation failure".to_string()),
                    ));
                }
                other => {
                    debug!(task_id = %task_id, status = %other, "Pollo task pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ProviderError::PollExhausted(self.max_polls))
    }
}

#[async_trait]
impl ProviderClient for PolloClient {
    fn name(&self) -> &'static str {
        "pollo"
    }

    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput> {
        let endpoint = Self::endpoint(capability)?;

        let image_url = match capability {
            Capability::ImageToVideo => Some(require_str(params, "image_url")?),
            _ => None,
        };

        let request = GenerationRequest {
            prompt: optional_str(params, "prompt").unwrap_or_default(),
            image_url,
            length: params
                .get("duration_seconds")
                .and_then(|v| v.as_u64())
                .unwrap_or(5) as u32,
        };

        let response = self
            .http
            .post(format!("{}/v1/generation/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let created: GenerationResponse = response.json().await?;
        debug!(task_id = %created.task_id, capability = %capability, "Pollo task created");
        self.poll_status(&created.task_id).await
    }
}

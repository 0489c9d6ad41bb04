//! GoEnhance client.
//!
//! GoEnhance handles video restyling and style transfer/compositing:
//! create a job with `POST /api/v1/jobs`, poll `GET /api/v1/jobs/{id}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vidgo_models::Capability;

use crate::client::{optional_str, require_str, ProviderClient, ProviderOutput, ProviderParams};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://api.goenhance.ai";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLLS: u32 = 60;

/// GoEnhance job client.
pub struct GoEnhanceClient {
    api_key: String,
    base_url: String,
    http: Client,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    #[serde(rename = "type")]
    job_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlay_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    state: String,
    #[serde(default)]
    output_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GoEnhanceClient {
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

    fn build_request<'a>(
        capability: Capability,
        params: &'a ProviderParams,
    ) -> ProviderResult<JobRequest<'a>> {
        match capability {
            Capability::VideoToVideo => Ok(JobRequest {
                job_type: "video2video",
                video_url: Some(require_str(params, "video_url")?),
                image_url: None,
                overlay_url: None,
                style_id: optional_str(params, "style_id"),
            }),
            // Style transfer doubles as the compositing step: an overlay
            // (e.g. a background-removed product cutout) is blended into the
            // base image with the selected style.
            Capability::StyleTransfer => Ok(JobRequest {
                job_type: "style_transfer",
                video_url: optional_str(params, "video_url"),
                image_url: Some(require_str(params, "image_url")?),
                overlay_url: optional_str(params, "overlay_url"),
                style_id: optional_str(params, "style_id"),
            }),
            other => Err(ProviderError::Unsupported(other)),
        }
    }

    async fn poll_job(&self, job_id: &str) -> ProviderResult<ProviderOutput> {
        for _ in 0..self.max_polls {
            let response = self
                .http
                .get(format!("{}/api/v1/jobs/{}", self.base_url, job_id))
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status, body });
            }

            let status: JobStatus = response.json().await?;
            match status.state.as_str() {
                "done" => {
                    let url = status.output_url.ok_or_else(|| {
                        ProviderError::Malformed("done without output_url".to_string())
                    })?;
                    return Ok(ProviderOutput::single(url));
                }
                "error" => {
                    return Err(ProviderError::TaskFailed(
                        status.error.unwrap_or_else(|| "job failed".to_string()),
                    ));
                }
                state => {
                    debug!(job_id = %job_id, state = %state, "GoEnhance job pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ProviderError::PollExhausted(self.max_polls))
    }
}

#[async_trait]
impl ProviderClient for GoEnhanceClient {
    fn name(&self) -> &'static str {
        "goenhance"
    }

    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput> {
        let request = Self::build_request(capability, params)?;

        let response = self
            .http
            .post(format!("{}/api/v1/jobs", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let created: JobCreated = response.json().await?;
        debug!(job_id = %created.job_id, capability = %capability, "GoEnhance job created");
        self.poll_job(&created.job_id).await
    }
}

//! A2E talking-avatar client.
//!
//! A2E renders lipsynced avatar videos. Rendering is slow (minutes), so the
//! poll budget here is much larger than for the image vendors; the dispatcher
//! additionally bounds the whole attempt with the avatar tool timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vidgo_models::Capability;

use crate::client::{optional_str, require_str, ProviderClient, ProviderOutput, ProviderParams};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://video.a2e.ai";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MAX_POLLS: u32 = 30;

/// A2E avatar video client.
pub struct A2eClient {
    api_key: String,
    base_url: String,
    http: Client,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    anchor_id: &'a str,
    msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<GenerateData>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    code: i32,
    data: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    status: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl A2eClient {
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

    async fn poll_result(&self, task_id: &str) -> ProviderResult<ProviderOutput> {
        for _ in 0..self.max_polls {
            let response = self
                .http
                .get(format!("{}/api/v1/video/{}", self.base_url, task_id))
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status, body });
            }

            let result: ResultResponse = response.json().await?;
            if result.code != 0 {
                return Err(ProviderError::Malformed(format!(
                    "unexpected result code {}",
                    result.code
                )));
            }
            let data = result
                .data
                .ok_or_else(|| ProviderError::Malformed("missing result data".to_string()))?;

            match data.status.as_str() {
                "success" => {
                    let url = data.result.ok_or_else(|| {
                        ProviderError::Malformed("success without result URL".to_string())
                    })?;
                    return Ok(ProviderOutput::single(url));
                }
                "failed" => {
                    return Err(ProviderError::TaskFailed(
                        data.reason
                            .unwrap_or_else(|| "avatar rendering failed".to_string()),
                    ));
                }
                status => {
                    debug!(task_id = %task_id, status = %status, "A2E render pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ProviderError::PollExhausted(self.max_polls))
    }
}

#[async_trait]
impl ProviderClient for A2eClient {
    fn name(&self) -> &'static str {
        "a2e"
    }

    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput> {
        if capability != Capability::Avatar {
            return Err(ProviderError::Unsupported(capability));
        }

        let request = GenerateRequest {
            anchor_id: require_str(params, "avatar_id")?,
            msg: require_str(params, "script")?,
            voice_id: optional_str(params, "voice_id"),
        };

        let response = self
            .http
            .post(format!("{}/api/v1/video/generate", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let created: GenerateResponse = response.json().await?;
        if created.code != 0 {
            return Err(ProviderError::TaskFailed(created.msg));
        }
        let task_id = created
            .data
            .map(|d| d.id)
            .ok_or_else(|| ProviderError::Malformed("missing task id".to_string()))?;

        debug!(task_id = %task_id, "A2E render started");
        self.poll_result(&task_id).await
    }
}

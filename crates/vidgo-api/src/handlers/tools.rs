//! Tool invocation handler.
//!
//! `POST /tools/{tool}` is the single entry point for all eight generation
//! tools. The dispatcher owns routing, billing, and failover; this handler
//! translates the terminal record into the HTTP contract:
//!
//! - completed → 200 with `success: true`
//! - `no_material_available` → 200 with `success: false` (soft miss)
//! - `insufficient_credits` → 402
//! - `all_providers_failed` / `pipeline_step_failed` → 503

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::info;

use vidgo_models::{GenerationFailure, GenerationRecord, GenerationRequest, GenerationStatus, ToolType};

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Successful tool invocation body.
#[derive(Serialize)]
pub struct ToolSuccessResponse {
    pub success: bool,
    pub generation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_video_url: Option<String>,
    pub credits_used: u32,
    pub used_backup: bool,
    pub demo: bool,
}

/// Failed tool invocation body.
#[derive(Serialize)]
pub struct ToolFailureResponse {
    pub success: bool,
    pub generation_id: String,
    pub error: &'static str,
    pub detail: String,
}

/// Invoke a generation tool.
pub async fn invoke_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    identity: Identity,
    Json(input_params): Json<HashMap<String, serde_json::Value>>,
) -> ApiResult<Response> {
    let tool_type: ToolType = tool
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Unknown tool: {tool}")))?;

    if let (Some(user_id), true) = (&identity.user_id, identity.plan.is_subscriber()) {
        state.ensure_account(user_id, identity.plan).await;
    }

    let request = GenerationRequest::new(identity.user_id, tool_type, input_params);
    let start = Instant::now();
    let record = state.dispatcher.dispatch(request, identity.plan).await?;
    let duration = start.elapsed().as_secs_f64();

    let outcome = record
        .failure
        .as_ref()
        .map(GenerationFailure::code)
        .unwrap_or("completed");
    metrics::record_dispatch(tool_type.as_str(), outcome, record.demo, duration);
    if record.status == GenerationStatus::Completed && record.credits_used > 0 {
        metrics::record_credits_committed(tool_type.as_str(), record.credits_used);
    }

    Ok(tool_response(tool_type, record))
}

fn tool_response(tool_type: ToolType, record: GenerationRecord) -> Response {
    match &record.failure {
        None => {
            let url = record.result_urls.first().cloned();
            let (result_url, result_video_url) = if tool_type.produces_video() {
                (None, url)
            } else {
                (url, None)
            };
            Json(ToolSuccessResponse {
                success: true,
                generation_id: record.id,
                result_url,
                result_video_url,
                credits_used: record.credits_used,
                used_backup: record.used_backup,
                demo: record.demo,
            })
            .into_response()
        }
        Some(failure) => {
            let status = match failure {
                // A demo miss is an expected outcome, not a server error
                GenerationFailure::NoMaterialAvailable => StatusCode::OK,
                GenerationFailure::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
                GenerationFailure::AllProvidersFailed { .. }
                | GenerationFailure::PipelineStepFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            };
            info!(generation_id = %record.id, error = failure.code(), "Generation failed");
            let body = ToolFailureResponse {
                success: false,
                generation_id: record.id.clone(),
                error: failure.code(),
                detail: failure.detail(),
            };
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_record(failure: GenerationFailure) -> GenerationRecord {
        let request = GenerationRequest::new(None, ToolType::ShortVideo, HashMap::new());
        GenerationRecord::failed(&request, failure, false)
    }

    #[test]
    fn test_insufficient_credits_maps_to_402() {
        let record = failed_record(GenerationFailure::InsufficientCredits {
            required: 25,
            available: 5,
        });
        let response = tool_response(ToolType::ShortVideo, record);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_provider_exhaustion_maps_to_503() {
        let record = failed_record(GenerationFailure::AllProvidersFailed {
            capability: vidgo_models::Capability::TextToVideo,
            detail: "last error".to_string(),
        });
        let response = tool_response(ToolType::ShortVideo, record);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_material_miss_is_200_soft_failure() {
        let record = failed_record(GenerationFailure::NoMaterialAvailable);
        let response = tool_response(ToolType::ShortVideo, record);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_video_tools_use_video_url_field() {
        let request = GenerationRequest::new(None, ToolType::ShortVideo, HashMap::new());
        let record =
            GenerationRecord::completed(&request, vec!["https://x/v.mp4".to_string()], 25, false, false);
        let response = tool_response(ToolType::ShortVideo, record);
        assert_eq!(response.status(), StatusCode::OK);
    }
}

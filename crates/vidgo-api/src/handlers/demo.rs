//! Demo preset handlers.
//!
//! These endpoints read the pre-generated material pool only. They never
//! touch the credit ledger or any provider.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vidgo_models::{MaterialExample, ToolType};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// One preset available for a tool.
#[derive(Serialize)]
pub struct PresetResponse {
    pub tool_type: ToolType,
    pub topic: String,
    pub preview_url: String,
}

impl From<MaterialExample> for PresetResponse {
    fn from(material: MaterialExample) -> Self {
        Self {
            tool_type: material.tool_type,
            topic: material.topic,
            // Demo users only ever see the watermarked rendition
            preview_url: material.watermarked_url,
        }
    }
}

/// List demo presets for a tool.
pub async fn list_presets(
    State(state): State<AppState>,
    Path(tool_type): Path<String>,
) -> ApiResult<Json<Vec<PresetResponse>>> {
    let tool_type: ToolType = tool_type
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Unknown tool: {tool_type}")))?;

    let materials = state
        .materials
        .list_for_tool(tool_type)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(materials.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize)]
pub struct UsePresetRequest {
    pub tool_type: ToolType,
    pub topic: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
pub struct UsePresetResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    pub credits_used: u32,
}

/// Resolve a preset to its watermarked result.
pub async fn use_preset(
    State(state): State<AppState>,
    Json(request): Json<UsePresetRequest>,
) -> ApiResult<Json<UsePresetResponse>> {
    let material = state
        .materials
        .find(request.tool_type, &request.topic, &request.params)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(match material {
        Some(material) => UsePresetResponse {
            success: true,
            result_url: Some(material.watermarked_url),
            error: None,
            credits_used: 0,
        },
        None => UsePresetResponse {
            success: false,
            result_url: None,
            error: Some("no_material_available"),
            credits_used: 0,
        },
    }))
}

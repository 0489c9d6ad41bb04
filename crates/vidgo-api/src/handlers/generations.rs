//! Generation history handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use vidgo_models::GenerationRecord;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct GenerationListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct GenerationListResponse {
    pub generations: Vec<GenerationRecord>,
}

/// List the authenticated user's generations, newest first.
pub async fn list_generations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<GenerationListQuery>,
) -> ApiResult<Json<GenerationListResponse>> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let generations = state
        .records
        .list_for_user(&user.user_id, limit)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(GenerationListResponse { generations }))
}

/// Soft-delete one of the user's generations.
pub async fn delete_generation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(generation_id): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state
        .records
        .soft_delete(&generation_id, &user.user_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "Generation {generation_id} not found"
        )))
    }
}

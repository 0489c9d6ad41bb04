//! Provider service-status handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use vidgo_providers::ProviderStatus;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ServiceStatusResponse {
    /// "operational" when every provider's last attempt succeeded.
    pub status: &'static str,
    pub providers: Vec<ProviderStatus>,
}

/// Last-known health of every routed provider.
///
/// Health is updated from real attempt outcomes, not active probes, so a
/// "down" provider recovers on the next successful failover attempt.
pub async fn service_status(State(state): State<AppState>) -> Json<ServiceStatusResponse> {
    let providers = state.registry.health_snapshot();
    let status = if providers.iter().all(|p| p.up) {
        "operational"
    } else {
        "degraded"
    };

    Json(ServiceStatusResponse { status, providers })
}

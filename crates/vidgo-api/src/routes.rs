//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::credits::{get_balance, get_credit_history};
use crate::handlers::demo::{list_presets, use_preset};
use crate::handlers::generations::{delete_generation, list_generations};
use crate::handlers::status::service_status;
use crate::handlers::tools::invoke_tool;
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Generation entry points
    let tool_routes = Router::new()
        .route("/tools/:tool", post(invoke_tool))
        .route("/demo/presets/:tool_type", get(list_presets))
        .route("/demo/use-preset", post(use_preset))
        .route("/generate/service-status", get(service_status));

    // Account surfaces
    let api_routes = Router::new()
        .route("/credits/balance", get(get_balance))
        .route("/credits/history", get(get_credit_history))
        .route("/generations", get(list_generations))
        .route("/generations/:generation_id", delete(delete_generation));

    let rate_limited = Router::new()
        .merge(tool_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(rate_limited)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use super::handlers::{
    admin_v2, echo_body_v1, echo_v1, echo_v2, greeting_v1, health, plain_v2, signup_check_v2,
    AppState,
};
use super::middleware::logging_middleware;
use crate::adapter::{api_handler, BodyLimit};
use crate::config::ApiConfig;
use crate::errors::PreHook;
use crate::metrics;
use crate::router::ApiRouter;

/// Routes served under `/api/v1`
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/echo", post(api_handler(echo_body_v1)))
        .route("/echo/:message", get(api_handler(echo_v1)))
        .route("/greeting", get(api_handler(greeting_v1)))
}

/// Routes served under `/api/v2`
pub fn v2_router() -> Router<AppState> {
    Router::new()
        .route("/echo/:message", get(api_handler(echo_v2)))
        .route("/admin", get(api_handler(admin_v2)))
        .route("/plain", get(api_handler(plain_v2)))
        .route("/signup/check", get(api_handler(signup_check_v2)))
}

/// Pre-hook logging the cause of every internal error
pub fn log_internal_error() -> PreHook {
    Arc::new(|cause| error!(cause = %cause, "Internal error while handling request"))
}

pub fn create_router(state: AppState, api: &ApiConfig) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = ApiRouter::new()
        // Health check
        .route("/health", get(health))
        // Metrics endpoint (Prometheus)
        .route("/metrics", get(metrics::metrics_handler));

    for version in &api.supported_versions {
        match version.as_str() {
            "v1" => router = router.mount_api_router(version, v1_router()),
            "v2" => router = router.mount_api_router(version, v2_router()),
            other => tracing::warn!(version = %other, "No routes implemented for version, skipping"),
        }
    }

    Router::from(
        router
            .default_api_info_handler(&api.current_version, api.supported_versions.iter().cloned())
            .default_api_error_handlers(Some(log_internal_error())),
    )
    // Add middleware (order matters: logging -> metrics -> cors -> trace)
    .layer(Extension(BodyLimit(api.max_body_bytes)))
    .layer(middleware::from_fn(logging_middleware))
    .layer(middleware::from_fn(metrics::middleware::track_metrics))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    // Add shared state
    .with_state(state)
}

//! Prometheus metrics endpoint
//!
//! Requires a valid session; scrapers pass one as a Bearer token.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::require_auth;
use crate::metrics::{REGISTRY, REPOSITORY_SESSIONS};

/// Metrics endpoint handler
async fn metrics_handler(State(state): State<AppState>) -> Response {
    REPOSITORY_SESSIONS.set(state.repositories.len() as i64);

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Create metrics router
pub fn metrics_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

//! Public client configuration

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;
use crate::config::FeatureFlags;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig {
    name: String,
    base_url: String,
    features: FeatureFlags,
    github_oauth: bool,
}

/// GET /api/config
async fn client_config(State(state): State<AppState>) -> Json<ClientConfig> {
    let config = &state.config;
    Json(ClientConfig {
        name: config.app.name.clone(),
        base_url: config.app.base_url.clone(),
        features: config.features,
        github_oauth: config.github.oauth_enabled(),
    })
}

/// Create config router (mounted under `/api`)
pub fn app_config_router() -> Router<AppState> {
    Router::new().route("/config", get(client_config))
}

//! Repodeck - GitHub repository dashboard service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Auth endpoints (email/password, GitHub OAuth)            │
//! │  - Repository dashboard endpoints                           │
//! │  - Config / health / metrics                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Repository Sync Layer                        │
//! │  - Per-session repository cache                             │
//! │  - Optimistic delete with rollback                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      GitHub REST API                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for the dashboard
//! - `auth`: Sessions, login and GitHub OAuth
//! - `github`: GitHub REST client and resources
//! - `sync`: Repository cache and mutation layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod metrics;
pub mod sync;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Session token signer/verifier
    pub sessions: Arc<auth::SessionCodec>,

    /// Email/password accounts
    pub users: Arc<dyn auth::UserStore>,

    /// GitHub OAuth app client
    pub oauth: Arc<auth::GitHubOAuthClient>,

    /// GitHub REST client
    pub github: Arc<github::GitHubClient>,

    /// Repository views of signed-in GitHub users
    pub repositories: Arc<sync::RepositorySessions>,
}

impl AppState {
    /// Initialize application state
    ///
    /// Accounts are seeded from `auth.users`.
    ///
    /// # Errors
    /// Returns error if a seeded password cannot be hashed or the HTTP
    /// client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let users = auth::InMemoryUserStore::from_seeds(
            &config.auth.users,
            config.auth.password_hash_cost,
        )?;
        tracing::info!(accounts = users.len(), "User store initialized");
        Self::with_user_store(config, Arc::new(users))
    }

    /// Initialize application state around an existing user store
    pub fn with_user_store(
        config: config::AppConfig,
        users: Arc<dyn auth::UserStore>,
    ) -> Result<Self, error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent("Repodeck/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let sessions = auth::SessionCodec::new(
            config.auth.session_secret.clone(),
            config.auth.session_max_age,
        );
        let oauth = auth::GitHubOAuthClient::new(http_client.clone(), &config.github);
        let github = Arc::new(github::GitHubClient::new(
            http_client,
            config.github.api_base_url.clone(),
        ));
        // Views expire after a session lifetime without use.
        let repositories = sync::RepositorySessions::new(
            github.clone(),
            std::time::Duration::from_secs(config.auth.session_max_age.max(1) as u64),
        );

        tracing::info!(
            oauth_enabled = config.github.oauth_enabled(),
            api = %github.api_base_url(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            users,
            oauth: Arc::new(oauth),
            github,
            repositories: Arc::new(repositories),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest(
            "/api",
            auth::auth_router()
                .merge(api::repositories_router())
                .merge(api::app_config_router()),
        )
        .merge(api::metrics_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(config: &config::AppConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::CorsLayer;

    if !config.server.environment.is_production() {
        return CorsLayer::permissive();
    }

    let allowed_origin = url::Url::parse(&config.app.base_url)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_else(|_| config.app.base_url.clone());
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => cors.allow_origin([origin]),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from app base URL; denying cross-origin requests"
            );
            cors
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

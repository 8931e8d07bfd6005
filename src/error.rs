//! Error types for Repodeck
//!
//! All errors reaching an HTTP handler are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::github::GitHubError;
use crate::sync::SyncError;

/// Generic message for every failed credential check.
///
/// Unknown email and wrong password share it so responses cannot be used
/// to enumerate accounts.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Email/password rejected (401)
    #[error("{}", INVALID_CREDENTIALS_MESSAGE)]
    InvalidCredentials,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// GitHub REST API error (status passed through, 5xx -> 502)
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// Repository mutation failed (status of the upstream cause)
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Map a GitHub error onto the status the dashboard API answers with.
fn github_status(error: &GitHubError) -> StatusCode {
    match error {
        GitHubError::MissingToken => StatusCode::UNAUTHORIZED,
        GitHubError::Api { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(|code| code.is_client_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        GitHubError::Network(_) | GitHubError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "invalid_credentials",
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::GitHub(error) => (github_status(error), error.to_string(), "github"),
            AppError::Sync(error) => (
                error
                    .upstream()
                    .map_or(StatusCode::INTERNAL_SERVER_ERROR, github_status),
                error.to_string(),
                "repository_sync",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "encryption")
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_client_errors_pass_their_status_through() {
        let error = AppError::GitHub(GitHubError::Api {
            status: 422,
            message: "name already exists on this account".to_string(),
        });
        let (status, message, _) = error.parts();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "name already exists on this account");
    }

    #[test]
    fn github_server_errors_become_bad_gateway() {
        let error = AppError::GitHub(GitHubError::Api {
            status: 503,
            message: "GitHub API error: 503".to_string(),
        });
        assert_eq!(error.parts().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_provider_token_is_unauthorized() {
        let error = AppError::GitHub(GitHubError::MissingToken);
        assert_eq!(error.parts().0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn invalid_credentials_uses_generic_message() {
        let (status, message, _) = AppError::InvalidCredentials.parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, INVALID_CREDENTIALS_MESSAGE);
    }

    #[tokio::test]
    async fn panicked_mutation_task_is_internal_error() {
        let join_error = tokio::spawn(async { panic!("mutation task panicked") })
            .await
            .expect_err("task panics");
        let error = AppError::Sync(SyncError::Task(join_error));
        assert_eq!(error.parts().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

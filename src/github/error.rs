//! GitHub error types.

use serde::Deserialize;
use thiserror::Error;

/// Errors returned by the GitHub REST client.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// No bearer token; the request never left the process.
    #[error("GitHub token not found. Please authenticate with GitHub first.")]
    MissingToken,

    /// Non-2xx response from the API.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// GitHub's `message`, or a generic status message.
        message: String,
    },

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 2xx response whose body did not match the expected shape.
    #[error("invalid response from GitHub: {0}")]
    Decode(String),
}

/// Error body returned by GitHub alongside 4xx/5xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Result type for GitHub operations.
pub type Result<T> = std::result::Result<T, GitHubError>;

impl GitHubError {
    /// Build an API error from a status and raw response body.
    ///
    /// Uses GitHub's `message` when the body is JSON carrying one, and
    /// falls back to `GitHub API error: <status>` otherwise.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("GitHub API error: {status}"));

        GitHubError::Api { status, message }
    }

    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the target resource does not exist (HTTP 404).
    ///
    /// Deletes treat this as success.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

//! GitHub OAuth exchange
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub:
//! authorize URL, code-for-token exchange, profile and primary email lookup.

use reqwest::header;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GitHubConfig;

/// Scopes requested from GitHub
pub const OAUTH_SCOPES: &str = "user:email read:user";

/// Failure of any step of the code exchange
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token exchange failed with status {status}")]
    TokenExchange { status: u16 },

    #[error("token response did not contain an access token")]
    MissingAccessToken,

    #[error("profile request failed with status {status}")]
    Profile { status: u16 },

    #[error("email list request failed with status {status}")]
    Emails { status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response from GitHub: {0}")]
    Decode(String),
}

/// Authenticated GitHub user plus the token that proved it
#[derive(Clone)]
pub struct GitHubIdentity {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub access_token: String,
}

impl std::fmt::Debug for GitHubIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubIdentity")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// GitHub token response
///
/// GitHub answers 200 with an `error` field for bad or reused codes.
#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub user info
#[derive(Debug, Deserialize)]
struct GitHubProfile {
    login: String,
    id: u64,
    name: Option<String>,
    email: Option<String>,
}

/// Entry of `GET /user/emails`
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
}

/// Client for the GitHub OAuth app
#[derive(Clone)]
pub struct GitHubOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    oauth_base_url: String,
    api_base_url: String,
}

impl GitHubOAuthClient {
    pub fn new(http: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            oauth_base_url: config.oauth_base_url.trim_end_matches('/').to_string(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// GitHub authorize URL with client id, redirect URI and scopes
    pub fn authorization_url(&self) -> String {
        let base = format!("{}/login/oauth/authorize", self.oauth_base_url);
        match url::Url::parse_with_params(
            &base,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", OAUTH_SCOPES),
            ],
        ) {
            Ok(url) => url.to_string(),
            Err(error) => {
                tracing::error!(%error, base = %base, "Invalid OAuth base URL");
                base
            }
        }
    }

    /// Exchange an authorization code for the user's identity
    ///
    /// # Steps
    /// 1. Exchange code for access token
    /// 2. Fetch user profile
    /// 3. Fetch email list when the profile has no public email
    ///
    /// Codes are single-use, so nothing here retries.
    pub async fn exchange_code_for_identity(
        &self,
        code: &str,
    ) -> Result<GitHubIdentity, OAuthError> {
        let access_token = self.exchange_code(code).await?;
        let profile = self.fetch_profile(&access_token).await?;

        let email = match profile.email.filter(|email| !email.trim().is_empty()) {
            Some(email) => Some(email),
            None => self.fetch_primary_email(&access_token).await?,
        };

        Ok(GitHubIdentity {
            id: profile.id,
            login: profile.login,
            name: profile.name,
            email,
            access_token,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_base_url))
            .header(header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
            });
        }

        let body: GitHubTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Decode(e.to_string()))?;

        match body.access_token.filter(|token| !token.is_empty()) {
            Some(token) => Ok(token),
            None => {
                tracing::warn!(
                    error = body.error.as_deref().unwrap_or("none"),
                    description = body.error_description.as_deref().unwrap_or(""),
                    "GitHub token response without access token"
                );
                Err(OAuthError::MissingAccessToken)
            }
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GitHubProfile, OAuthError> {
        let response = self.api_get("/user", access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::Profile {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Decode(e.to_string()))
    }

    async fn fetch_primary_email(&self, access_token: &str) -> Result<Option<String>, OAuthError> {
        let response = self.api_get("/user/emails", access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::Emails {
                status: status.as_u16(),
            });
        }

        let emails: Vec<GitHubEmail> = response
            .json()
            .await
            .map_err(|e| OAuthError::Decode(e.to_string()))?;

        Ok(emails
            .into_iter()
            .find(|entry| entry.primary)
            .map(|entry| entry.email))
    }

    fn api_get(&self, path: &str, access_token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.api_base_url, path))
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
    }
}

impl std::fmt::Debug for GitHubOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubOAuthClient")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubOAuthClient {
        GitHubOAuthClient::new(
            reqwest::Client::new(),
            &GitHubConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_uri: "http://localhost:3000/api/auth/github/callback".to_string(),
                oauth_base_url: "https://github.com/".to_string(),
                api_base_url: "https://api.github.com".to_string(),
            },
        )
    }

    #[test]
    fn authorization_url_embeds_client_redirect_and_scopes() {
        let url = url::Url::parse(&client().authorization_url()).unwrap();
        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "test-client-id".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://localhost:3000/api/auth/github/callback".to_string()
                ),
                ("scope".to_string(), OAUTH_SCOPES.to_string()),
            ]
        );
    }

    #[test]
    fn authorization_url_is_deterministic() {
        assert_eq!(client().authorization_url(), client().authorization_url());
    }

    #[test]
    fn identity_debug_hides_access_token() {
        let identity = GitHubIdentity {
            id: 1,
            login: "octocat".to_string(),
            name: None,
            email: None,
            access_token: "gho_secret".to_string(),
        };
        assert!(!format!("{identity:?}").contains("gho_secret"));
    }
}

//! GitHub REST client for repository operations.

use std::collections::BTreeMap;
use std::time::Instant;

use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde::de::DeserializeOwned;

use super::error::{GitHubError, Result};
use super::models::{
    CreateRepositoryParams, ListRepositoriesParams, Repository, UpdateRepositoryParams,
};
use crate::metrics::{GITHUB_REQUEST_DURATION_SECONDS, GITHUB_REQUESTS_TOTAL};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// GitHub REST client.
///
/// Stateless apart from the shared HTTP client: every call takes the
/// caller's bearer token, so one instance serves every session.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
}

impl GitHubClient {
    /// Creates a client against `api_base_url` (e.g. `https://api.github.com`).
    pub fn new(http: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// `GET /user/repos`
    pub async fn list_user_repositories(
        &self,
        token: &str,
        params: &ListRepositoriesParams,
    ) -> Result<Vec<Repository>> {
        let request = self.request(Method::GET, "/user/repos", token)?.query(params);
        Ok(self
            .execute::<Vec<Repository>>("list_repositories", request)
            .await?
            .unwrap_or_default())
    }

    /// `GET /repos/{owner}/{repo}`
    pub async fn get_repository(&self, token: &str, owner: &str, name: &str) -> Result<Repository> {
        let request = self.request(Method::GET, &repo_path(owner, name), token)?;
        self.execute("get_repository", request)
            .await?
            .ok_or_else(|| GitHubError::Decode("empty repository response".to_string()))
    }

    /// `GET /repos/{owner}/{repo}/languages`
    pub async fn get_repository_languages(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<BTreeMap<String, u64>> {
        let path = format!("{}/languages", repo_path(owner, name));
        let request = self.request(Method::GET, &path, token)?;
        Ok(self
            .execute("get_repository_languages", request)
            .await?
            .unwrap_or_default())
    }

    /// `POST /user/repos`
    pub async fn create_repository(
        &self,
        token: &str,
        params: &CreateRepositoryParams,
    ) -> Result<Repository> {
        let request = self
            .request(Method::POST, "/user/repos", token)?
            .json(params);
        self.execute("create_repository", request)
            .await?
            .ok_or_else(|| GitHubError::Decode("empty repository response".to_string()))
    }

    /// `PATCH /repos/{owner}/{repo}`
    pub async fn update_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
        params: &UpdateRepositoryParams,
    ) -> Result<Repository> {
        let request = self
            .request(Method::PATCH, &repo_path(owner, name), token)?
            .json(params);
        self.execute("update_repository", request)
            .await?
            .ok_or_else(|| GitHubError::Decode("empty repository response".to_string()))
    }

    /// `DELETE /repos/{owner}/{repo}`
    ///
    /// GitHub answers 204 with no body.
    pub async fn delete_repository(&self, token: &str, owner: &str, name: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &repo_path(owner, name), token)?;
        self.execute::<serde_json::Value>("delete_repository", request)
            .await?;
        Ok(())
    }

    /// Build an authenticated request, refusing to proceed without a token.
    fn request(&self, method: Method, path: &str, token: &str) -> Result<RequestBuilder> {
        if token.trim().is_empty() {
            return Err(GitHubError::MissingToken);
        }

        Ok(self
            .http
            .request(method, format!("{}{}", self.api_base_url, path))
            .bearer_auth(token)
            .header(header::ACCEPT, GITHUB_ACCEPT))
    }

    /// Send a request and decode the body.
    ///
    /// Returns `Ok(None)` for 204 and empty 2xx bodies.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let started = Instant::now();
        let result = request.send().await;
        GITHUB_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                GITHUB_REQUESTS_TOTAL
                    .with_label_values(&[operation, "network_error"])
                    .inc();
                tracing::warn!(operation, %error, "GitHub request failed");
                return Err(GitHubError::Network(error));
            }
        };

        let status = response.status();
        GITHUB_REQUESTS_TOTAL
            .with_label_values(&[operation, status.as_str()])
            .inc();
        tracing::debug!(operation, status = status.as_u16(), "GitHub response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::from_response(status.as_u16(), &body));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| GitHubError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

fn repo_path(owner: &str, name: &str) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(owner),
        urlencoding::encode(name)
    )
}

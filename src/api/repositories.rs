//! Repository dashboard endpoints
//!
//! Every handler works on the caller's [`RepositorySync`] view, so reads
//! come from the session cache and writes keep it consistent.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::GitHubSession;
use crate::error::{AppError, Result};
use crate::github::{CreateRepositoryParams, Repository, RepositoryKey, UpdateRepositoryParams};
use crate::sync::RepositorySync;

/// Create repositories router (mounted under `/api`)
pub fn repositories_router() -> Router<AppState> {
    Router::new()
        .route("/repos", get(list_repositories).post(create_repository))
        .route("/repos/batch-delete", post(batch_delete))
        .route(
            "/repos/:owner/:repo",
            get(get_repository)
                .patch(update_repository)
                .delete(delete_repository),
        )
        .route("/repos/:owner/:repo/languages", get(get_languages))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Skip the cache and refetch from GitHub
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct BatchDeleteRequest {
    repositories: Vec<RepositoryKey>,
}

#[derive(Debug, Serialize)]
struct BatchDeleteResponse {
    deleted: usize,
}

fn repository_view(state: &AppState, github: &GitHubSession) -> Arc<RepositorySync> {
    state
        .repositories
        .get_or_create(github.user_id(), &github.access_token)
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// GET /api/repos
async fn list_repositories(
    State(state): State<AppState>,
    github: GitHubSession,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Repository>>> {
    let repositories = repository_view(&state, &github);
    let list = if query.refresh {
        repositories.fetch_list().await?
    } else {
        repositories.list().await?
    };
    Ok(Json(list))
}

/// POST /api/repos
async fn create_repository(
    State(state): State<AppState>,
    github: GitHubSession,
    payload: std::result::Result<Json<CreateRepositoryParams>, JsonRejection>,
) -> Result<(StatusCode, Json<Repository>)> {
    let params = body(payload)?;
    if params.name.trim().is_empty() {
        return Err(AppError::Validation(
            "Repository name is required".to_string(),
        ));
    }

    let created = repository_view(&state, &github).create(&params).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/repos/:owner/:repo
async fn get_repository(
    State(state): State<AppState>,
    github: GitHubSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Repository>> {
    let repository = repository_view(&state, &github)
        .detail(&owner, &repo)
        .await?;
    Ok(Json(repository))
}

/// GET /api/repos/:owner/:repo/languages
async fn get_languages(
    State(state): State<AppState>,
    github: GitHubSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<BTreeMap<String, u64>>> {
    let languages = repository_view(&state, &github)
        .languages(&owner, &repo)
        .await?;
    Ok(Json(languages))
}

/// PATCH /api/repos/:owner/:repo
async fn update_repository(
    State(state): State<AppState>,
    github: GitHubSession,
    Path((owner, repo)): Path<(String, String)>,
    payload: std::result::Result<Json<UpdateRepositoryParams>, JsonRejection>,
) -> Result<Json<Repository>> {
    let params = body(payload)?;
    if params.is_empty() {
        return Err(AppError::Validation("No changes requested".to_string()));
    }

    let updated = repository_view(&state, &github)
        .update(&owner, &repo, &params)
        .await?;
    Ok(Json(updated))
}

/// DELETE /api/repos/:owner/:repo
async fn delete_repository(
    State(state): State<AppState>,
    github: GitHubSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<StatusCode> {
    repository_view(&state, &github)
        .delete(&owner, &repo)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/repos/batch-delete
async fn batch_delete(
    State(state): State<AppState>,
    github: GitHubSession,
    payload: std::result::Result<Json<BatchDeleteRequest>, JsonRejection>,
) -> Result<Json<BatchDeleteResponse>> {
    let request = body(payload)?;
    let deleted = repository_view(&state, &github)
        .batch_delete(&request.repositories)
        .await?;
    Ok(Json(BatchDeleteResponse { deleted }))
}

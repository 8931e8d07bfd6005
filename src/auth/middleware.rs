//! Authentication middleware
//!
//! Resolves the caller's session from the `auth_token` cookie or an
//! `Authorization: Bearer` header.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::Session;
use crate::AppState;
use crate::error::AppError;
use crate::github::GitHubError;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "auth_token";

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned())
        })
        .filter(|token| !token.is_empty())
}

fn authenticate_token(token: &str, state: &AppState) -> Result<Session, AppError> {
    state.sessions.verify(token).ok_or(AppError::Unauthorized)
}

/// Middleware to require authentication
///
/// Adds the verified [`Session`] to request extensions.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    let session = authenticate_token(&token, &state)?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Extractor for the current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(session): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", session.claims.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(CurrentUser(session));
        }

        let state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let session = authenticate_token(&token, &state)?;
        parts.extensions.insert(session.clone());

        Ok(CurrentUser(session))
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(MaybeUser(Some(session)));
        }

        let app_state = AppState::from_ref(state);
        let session = extract_token_from_headers(&parts.headers)
            .and_then(|token| authenticate_token(&token, &app_state).ok());

        if let Some(session) = &session {
            parts.extensions.insert(session.clone());
        }

        Ok(MaybeUser(session))
    }
}

/// Session that carries a GitHub access token
///
/// Email/password sessions are rejected with 401, since they have no token
/// to call GitHub with.
#[derive(Debug, Clone)]
pub struct GitHubSession {
    pub session: Session,
    pub access_token: String,
}

impl GitHubSession {
    pub fn user_id(&self) -> &str {
        &self.session.claims.user_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for GitHubSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(session) = CurrentUser::from_request_parts(parts, state).await?;

        let access_token = session
            .access_token()
            .map(ToOwned::to_owned)
            .ok_or(AppError::GitHub(GitHubError::MissingToken))?;

        Ok(GitHubSession {
            session,
            access_token,
        })
    }
}

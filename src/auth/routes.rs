//! Auth routes
//!
//! - POST /api/auth/login - Email/password login
//! - GET /api/auth/me - Current identity
//! - POST /api/auth/logout - Clear session
//! - GET /api/auth/github - Redirect to GitHub
//! - GET /api/auth/github/callback - GitHub OAuth callback

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use super::middleware::{CurrentUser, MaybeUser, SESSION_COOKIE};
use super::oauth::GitHubIdentity;
use super::session::{Provider, SessionClaims};
use super::users::{UserRecord, UserStore};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::{LOGINS_TOTAL, LOGOUTS_TOTAL};

/// Create auth router (mounted under `/api`)
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/github", get(github_redirect))
        .route("/auth/github/callback", get(github_callback))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginUser {
    id: String,
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    user: LoginUser,
}

/// Identity returned by `/api/auth/me`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    id: String,
    email: String,
    name: String,
    provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdentityResponse {
    user: Identity,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

/// Check email/password against the store
///
/// Empty fields fail before the store is consulted. Unknown email and wrong
/// password fail identically.
pub(crate) async fn authenticate(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<UserRecord, AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = users
        .find_by_email(email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !users.verify_password(&user, password).await? {
        return Err(AppError::InvalidCredentials);
    }

    Ok(user)
}

/// Email/password login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let user = match authenticate(state.users.as_ref(), &request.email, &request.password).await {
        Ok(user) => user,
        Err(error) => {
            LOGINS_TOTAL.with_label_values(&["email", "rejected"]).inc();
            return Err(error);
        }
    };

    let claims = SessionClaims {
        user_id: user.id.clone(),
        email: user.email.clone(),
        name: Some(user.name.clone()),
        provider: Some(Provider::Email),
        access_token: None,
    };
    let token = state.sessions.sign(&claims)?;

    LOGINS_TOTAL.with_label_values(&["email", "success"]).inc();
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        jar.add(session_cookie(token, &state)),
        Json(LoginResponse {
            success: true,
            user: LoginUser {
                id: user.id,
                email: user.email,
                name: user.name,
            },
        }),
    ))
}

/// Current identity
///
/// GitHub sessions answer from their claims; email sessions are looked up
/// again so deleted accounts stop resolving.
async fn me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<IdentityResponse>, AppError> {
    let user = match session.provider() {
        Provider::Github => {
            let claims = &session.claims;
            let name = claims
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| email_local_part(&claims.email).to_string());
            Identity {
                id: claims.user_id.clone(),
                email: claims.email.clone(),
                name,
                provider: Provider::Github,
                access_token: session.access_token().map(ToOwned::to_owned),
            }
        }
        Provider::Email => {
            let record = state
                .users
                .find_by_id(&session.claims.user_id)
                .await?
                .ok_or(AppError::NotFound)?;
            Identity {
                id: record.id,
                email: record.email,
                name: record.name,
                provider: Provider::Email,
                access_token: None,
            }
        }
    };

    Ok(Json(IdentityResponse { user }))
}

/// Logout
///
/// Always clears the cookie.
async fn logout(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
    jar: CookieJar,
) -> (CookieJar, Json<SuccessResponse>) {
    if let Some(session) = session {
        if state.repositories.evict(&session.claims.user_id) {
            tracing::debug!(user_id = %session.claims.user_id, "Repository cache dropped");
        }
        tracing::info!(user_id = %session.claims.user_id, "User logged out");
    }
    LOGOUTS_TOTAL.inc();

    (
        jar.add(clear_session_cookie()),
        Json(SuccessResponse { success: true }),
    )
}

/// Start GitHub OAuth
async fn github_redirect(State(state): State<AppState>) -> Redirect {
    if !state.config.github.oauth_enabled() {
        tracing::warn!("GitHub OAuth requested but client credentials are not configured");
    }
    Redirect::to(&state.oauth.authorization_url())
}

/// Query parameters from GitHub callback
#[derive(Debug, Deserialize)]
struct GitHubCallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

/// GitHub OAuth callback
///
/// # Flow
/// 1. Bail out if GitHub reported an error (user cancelled)
/// 2. Exchange code for identity
/// 3. Create session and set cookie
/// 4. Redirect to the dashboard
async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<GitHubCallbackQuery>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(error) = query.error {
        tracing::warn!(%error, "GitHub OAuth returned an error");
        LOGINS_TOTAL.with_label_values(&["github", "cancelled"]).inc();
        return (jar, error_redirect("github_auth_cancelled"));
    }

    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        LOGINS_TOTAL.with_label_values(&["github", "rejected"]).inc();
        return (jar, error_redirect("missing_code"));
    };

    let identity = match state.oauth.exchange_code_for_identity(&code).await {
        Ok(identity) => identity,
        Err(error) => {
            tracing::error!(%error, "GitHub OAuth exchange failed");
            LOGINS_TOTAL.with_label_values(&["github", "failure"]).inc();
            return (jar, error_redirect("failed_to_get_user"));
        }
    };

    let claims = github_claims(&identity);
    let token = match state.sessions.sign(&claims) {
        Ok(token) => token,
        Err(error) => {
            tracing::error!(%error, "Failed to sign session token");
            LOGINS_TOTAL.with_label_values(&["github", "failure"]).inc();
            return (jar, error_redirect("failed_to_get_user"));
        }
    };

    LOGINS_TOTAL.with_label_values(&["github", "success"]).inc();
    tracing::info!(user_id = %claims.user_id, login = %identity.login, "GitHub user logged in");

    (
        jar.add(session_cookie(token, &state)),
        Redirect::to(&state.config.app.dashboard_path),
    )
}

/// Session claims of a GitHub identity
fn github_claims(identity: &GitHubIdentity) -> SessionClaims {
    let email = identity
        .email
        .clone()
        .filter(|email| !email.is_empty())
        .unwrap_or_else(|| format!("{}@github.local", identity.login));
    let name = identity
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| identity.login.clone());

    SessionClaims {
        user_id: format!("github_{}", identity.id),
        email,
        name: Some(name),
        provider: Some(Provider::Github),
        access_token: Some(identity.access_token.clone()),
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn error_redirect(code: &str) -> Redirect {
    Redirect::to(&format!("/?error={code}"))
}

fn session_cookie(token: String, state: &AppState) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            state.sessions.max_age().num_seconds(),
        ))
        .build()
}

/// Expired session cookie; added rather than removed so the header is sent
/// even when the request carried no cookie
fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

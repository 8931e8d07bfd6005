//! Authentication
//!
//! Handles:
//! - Email/password login against a [`UserStore`]
//! - GitHub OAuth flow
//! - Signed session cookies
//! - Authentication middleware and extractors

mod middleware;
mod oauth;
mod routes;
pub mod session;
pub mod users;

pub use middleware::{CurrentUser, GitHubSession, MaybeUser, SESSION_COOKIE, require_auth};
pub use oauth::{GitHubIdentity, GitHubOAuthClient, OAUTH_SCOPES, OAuthError};
pub use routes::auth_router;
pub use session::{
    Provider, Session, SessionClaims, SessionCodec, create_session_token, verify_session_token,
};
pub use users::{InMemoryUserStore, UserRecord, UserStore};

//! Session tokens
//!
//! Uses HMAC-signed tokens stored in the `auth_token` cookie.
//! No server-side session storage needed.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Identity provider that issued a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Github,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Github => "github",
        }
    }
}

/// Identity claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// GitHub access token, only for GitHub sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Signed payload: claims plus issue/expiry timestamps (unix seconds)
#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(flatten)]
    claims: SessionClaims,
    iat: i64,
    exp: i64,
}

/// A verified session
#[derive(Debug, Clone)]
pub struct Session {
    pub claims: SessionClaims,
    /// When session was created
    pub issued_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn provider(&self) -> Provider {
        self.claims.provider.unwrap_or(Provider::Email)
    }

    /// GitHub access token, if this session carries a non-empty one
    pub fn access_token(&self) -> Option<&str> {
        self.claims
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

/// Create a signed session token issued now
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `claims` - Identity claims to encode
/// * `secret` - HMAC secret key
/// * `max_age` - Lifetime of the token
pub fn create_session_token(
    claims: &SessionClaims,
    secret: &str,
    max_age: Duration,
) -> Result<String, AppError> {
    create_session_token_at(claims, secret, Utc::now(), max_age)
}

/// Create a signed session token with an explicit issue time
pub fn create_session_token_at(
    claims: &SessionClaims,
    secret: &str,
    issued_at: DateTime<Utc>,
    max_age: Duration,
) -> Result<String, AppError> {
    let payload = TokenPayload {
        claims: claims.clone(),
        iat: issued_at.timestamp(),
        exp: (issued_at + max_age).timestamp(),
    };

    // 1. Serialize payload to JSON
    let payload = serde_json::to_string(&payload).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// Returns `None` for malformed, tampered or expired tokens. Callers treat
/// that exactly like a missing session.
pub fn verify_session_token(token: &str, secret: &str) -> Option<Session> {
    // 1. Split token into payload and signature
    let (payload_b64, signature_b64) = token.split_once('.')?;
    if signature_b64.contains('.') {
        return None;
    }

    // 2. Verify HMAC signature
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload_b64.as_bytes());
    let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    mac.verify_slice(&signature).ok()?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let payload: TokenPayload = serde_json::from_slice(&payload_bytes).ok()?;

    let session = Session {
        claims: payload.claims,
        issued_at: Utc.timestamp_opt(payload.iat, 0).single()?,
        expires_at: Utc.timestamp_opt(payload.exp, 0).single()?,
    };

    // 4. Check if session is expired
    if session.is_expired() {
        return None;
    }

    Some(session)
}

/// Token codec bound to the process-wide secret and lifetime
#[derive(Clone)]
pub struct SessionCodec {
    secret: String,
    max_age: Duration,
}

impl SessionCodec {
    pub fn new(secret: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            max_age: Duration::seconds(max_age_seconds),
        }
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, AppError> {
        create_session_token(claims, &self.secret, self.max_age)
    }

    pub fn verify(&self, token: &str) -> Option<Session> {
        verify_session_token(token, &self.secret)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

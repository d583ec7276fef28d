//! HTTP Basic-auth extractor and role tiers.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

/// Access tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  ReadOnly,
  Execute,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ReadOnly => "read_only",
      Self::Execute => "execute",
      Self::Admin => "admin",
    }
  }
}

/// One account allowed to call the API.
#[derive(Debug, Clone, Deserialize)]
pub struct UserCredential {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub role:          Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
  #[serde(default)]
  pub users: Vec<UserCredential>,
}

/// The authenticated caller of a handler.
#[derive(Debug, Clone)]
pub struct Caller {
  pub username: String,
  pub role:     Role,
}

impl Caller {
  /// Fail with 403 unless the caller holds at least `role`.
  pub fn require(&self, role: Role) -> Result<(), ApiError> {
    if self.role >= role { Ok(()) } else { Err(ApiError::Forbidden(role)) }
  }
}

/// Verify Basic credentials from `headers` against `config`.
pub fn authenticate(headers: &HeaderMap, config: &AuthConfig) -> Result<Caller, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val.strip_prefix("Basic ").ok_or(ApiError::Unauthorized)?;
  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  let user = config
    .users
    .iter()
    .find(|u| u.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_| ApiError::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(Caller { username: user.username.clone(), role: user.role })
}

impl<S, T> FromRequestParts<AppState<S, T>> for Caller
where
  S: Send + Sync,
  T: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState<S, T>) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, &state.auth)
  }
}

//! Password hashing and cookie sessions.
//!
//! Passwords are stored as Argon2id PHC strings. The session cookie carries a
//! session id and a secret; the secret is checked with a constant-time comparison.

use std::sync::OnceLock;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::db::SessionToken;
use crate::errors::AppError;
use crate::models::Role;
use crate::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "admissions_session";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Burn the same work as a real verification, for logins with unknown usernames.
pub fn verify_against_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let dummy = DUMMY_HASH.get_or_init(|| hash_password("dummy-password-for-timing").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Build the session cookie for a freshly opened session.
pub fn session_cookie(token: &SessionToken, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.cookie_value()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// A cookie that clears the session cookie on the client.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Identity of the signed-in account, resolved per request from the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub account_id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    /// Fail with a permission error unless the account is an admin.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            return Ok(());
        }
        tracing::warn!("Permission denied for {} (role {})", self.username, self.role);
        Err(AppError::Forbidden("Permission denied".to_string()))
    }
}

/// Resolve the session cookie to an identity, if it names a live session.
pub async fn resolve_session(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| SessionToken::parse(c.value()))
    else {
        return Ok(None);
    };

    let Some(session) = state.repo.find_session(&token.id).await? else {
        return Ok(None);
    };

    if !constant_time_compare(&token.secret, &session.secret) {
        tracing::warn!("Session {} presented with a wrong secret", token.id);
        return Ok(None);
    }

    Ok(Some(CurrentUser {
        account_id: session.account.id,
        username: session.account.username,
        role: session.account.role,
    }))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        match resolve_session(state, &jar).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(Redirect::to("/login").into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

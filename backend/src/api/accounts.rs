//! Registration, login and logout.

use axum::{extract::State, response::Redirect, Form};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::{
    hash_password, removal_cookie, session_cookie, verify_against_dummy, verify_password,
    SESSION_COOKIE,
};
use crate::db::SessionToken;
use crate::errors::AppError;
use crate::models::{LoginForm, RegisterForm};
use crate::AppState;

/// POST /register - Create an account, then send the user to the login form.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    let request = form.validate()?;

    if state
        .repo
        .find_account_by_username(&request.username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    // Argon2 hashing blocks; run it off the async workers
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

    // The UNIQUE constraint still catches a concurrent registration of the same name
    let account = state
        .repo
        .create_account(&request.username, &password_hash, request.role)
        .await?;

    tracing::info!(
        account_id = account.id,
        role = %account.role,
        "Registered account {}",
        account.username
    );

    Ok(Redirect::to("/login"))
}

/// POST /login - Verify credentials and open a session.
///
/// Unknown usernames and wrong passwords produce the same error.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    let request = form.validate()?;
    let account = state
        .repo
        .find_account_by_username(&request.username)
        .await?;

    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || match account {
        Some(account) if verify_password(&password, &account.password_hash) => Some(account),
        Some(_) => None,
        None => {
            verify_against_dummy(&password);
            None
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?;

    let Some(account) = verified else {
        tracing::warn!("Failed login attempt for {}", request.username);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let token = state
        .repo
        .create_session(account.id, state.config.session_ttl())
        .await?;
    tracing::info!(account_id = account.id, "User {} logged in", account.username);

    let jar = jar.add(session_cookie(&token, state.config.secure_cookies));
    Ok((jar, Redirect::to("/dashboard")))
}

/// GET /logout - Drop the session. Always succeeds, with or without one.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(token) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| SessionToken::parse(c.value()))
    {
        if let Err(e) = state.repo.delete_session(&token.id).await {
            tracing::warn!("Failed to delete session {}: {}", token.id, e);
        }
    }

    (jar.remove(removal_cookie()), Redirect::to("/login"))
}

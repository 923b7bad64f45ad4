use crate::error::{AppError, AppResult};
use crate::models::{User, NAME_MAX_CHARS};
use crate::store::Store;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::{header, HeaderMap, HeaderValue};
use tracing::info;

pub const SESSION_COOKIE: &str = "session";
pub const PASSWORD_MIN_CHARS: usize = 6;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn register(store: &Store, username: &str, password: &str) -> AppResult<User> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > NAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "username must be 1 to {} characters",
            NAME_MAX_CHARS
        )));
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }

    let hash = hash_password(password)?;
    match store.create_user(username, &hash).await {
        Ok(user) => {
            info!("Registered user {} ({})", user.username, user.id);
            Ok(user)
        }
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            Err(AppError::Conflict(format!("username {} is taken", username)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks the credentials and opens a session, returning its token.
pub async fn login(store: &Store, username: &str, password: &str) -> AppResult<Option<String>> {
    let Some(user) = store.find_user_by_username(username.trim()).await? else {
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash) {
        return Ok(None);
    }
    let token = store.create_session(user.id).await?;
    info!("User {} logged in", user.username);
    Ok(Some(token))
}

pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

pub async fn current_user(store: &Store, headers: &HeaderMap) -> AppResult<Option<User>> {
    match session_token(headers) {
        Some(token) => Ok(store.user_for_session(token).await?),
        None => Ok(None),
    }
}

pub fn session_cookie(token: &str) -> HeaderValue {
    // Tokens are UUIDs, always valid header bytes.
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("session=; Path=/"))
}

pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

//! Auth HTTP handlers: register, login, logout, session validation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::db::{SessionRow, UserRow};
use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::middleware::SessionAuth;

/// Name of the session cookie set on register/login.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 64))]
    pub login: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Public user representation. Never exposes the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub login: String,
    pub password_expires_at: DateTime<Utc>,
}

impl From<UserRow> for UserResponse {
    fn from(user: UserRow) -> Self {
        Self {
            id: user.id.to_string(),
            login: user.login,
            password_expires_at: user.password_expires_at,
        }
    }
}

fn session_cookie(key: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, key.to_string()))
        .http_only(true)
        .path("/")
        .build()
}

/// POST /users/register
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, (StatusCode, Json<UserResponse>)), AppError> {
    body.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    let user = state.users().register(&body.login, &body.password).await?;
    let session = state.sessions().create(user.id).await?;

    let jar = jar.add(session_cookie(session.key));
    Ok((jar, (StatusCode::CREATED, Json(user.into()))))
}

/// POST /users/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserResponse>), AppError> {
    let user = state.users().login(&body.login, &body.password).await?;
    let session = state.sessions().create(user.id).await?;

    let jar = jar.add(session_cookie(session.key));
    Ok((jar, Json(user.into())))
}

/// POST /users/logout — requires a valid session cookie.
pub async fn logout(
    State(state): State<AppState>,
    SessionAuth(session): SessionAuth,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    state.sessions().delete(session.key).await?;
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok((jar, Json(json!({ "ok": true }))))
}

/// GET /users/sessions/:key — validate a session key.
pub async fn session(
    State(state): State<AppState>,
    Path(key): Path<Uuid>,
) -> Result<Json<SessionRow>, AppError> {
    let session = state.sessions().validate(key).await?;
    Ok(Json(session))
}

//! Session auth: validates the `session` cookie against the sessions table.

use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::SESSION_COOKIE;
use crate::db::SessionRow;
use crate::error::AppError;
use crate::handlers::http::AppState;

/// Extractor: the validated session behind the request's `session` cookie.
#[derive(Debug)]
pub struct SessionAuth(pub SessionRow);

#[axum::async_trait]
impl axum::extract::FromRequestParts<AppState> for SessionAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let raw = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::Auth("missing session cookie".to_string()))?;
        let key = Uuid::parse_str(&raw)
            .map_err(|_| AppError::Auth("invalid session cookie".to_string()))?;
        let session = state.sessions().validate(key).await?;
        Ok(SessionAuth(session))
    }
}

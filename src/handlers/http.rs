//! Shared application state and the health probe.

use axum::{http::StatusCode, Json};
use serde_json::json;

use crate::db::DbPool;
use crate::services::{SessionsService, UsersService};

/// Shared application state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub users: UsersService,
    pub sessions: SessionsService,
}

impl AppState {
    pub fn db(&self) -> &DbPool {
        &self.db
    }
    pub fn users(&self) -> &UsersService {
        &self.users
    }
    pub fn sessions(&self) -> &SessionsService {
        &self.sessions
    }
}

/// GET /health — liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "authd" })),
    )
}
